// tests/no_index_mutation.rs
// Fails if the processed-image list is mutated in place outside the queue
// module. Every change must go through ImageQueue, which replaces the list and
// addresses images by id.

use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = fs::read_dir(dir) {
        for e in entries.flatten() {
            let p = e.path();
            if p.is_dir() {
                collect_rs_files(&p, files);
            } else if p.extension().map(|s| s == "rs").unwrap_or(false) {
                files.push(p);
            }
        }
    }
}

fn is_whitelisted(path: &Path) -> bool {
    let p = path.to_string_lossy();
    p.contains("/review/queue.rs") || p.contains("\\review\\queue.rs")
}

#[test]
fn image_list_is_only_mutated_by_the_queue() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let src_dir = Path::new(manifest_dir).join("src");

    let mut files = Vec::new();
    collect_rs_files(&src_dir, &mut files);
    assert!(!files.is_empty(), "no sources found under {}", src_dir.display());

    let bad_patterns = [
        "images.push(",
        "images.remove(",
        "images.retain(",
        "images.insert(",
        "images.get_mut(",
        "images.iter_mut(",
        "images.swap(",
        "images.truncate(",
        "Arc::make_mut(",
    ];

    let mut offenders: Vec<(String, String)> = Vec::new();

    for file in files {
        if is_whitelisted(&file) {
            continue;
        }
        let content = match fs::read_to_string(&file) {
            Ok(c) => c,
            Err(_) => continue,
        };

        for pat in &bad_patterns {
            if content.contains(pat) {
                offenders.push((file.to_string_lossy().to_string(), pat.to_string()));
            }
        }
    }

    if !offenders.is_empty() {
        let mut msg = String::from("In-place image list mutation found outside the queue:\n");
        for (file, pat) in offenders {
            msg.push_str(&format!(
                "  {} contains pattern '{}': use ImageQueue's id-keyed operations instead\n",
                file, pat
            ));
        }
        panic!("{}", msg);
    }
}
