// src/ui/systems.rs
use bevy::prelude::*;
use std::any;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::review::events::ReviewFeedback;
use crate::review::resources::ReviewSession;
use crate::ui::UiFeedbackState;

pub fn handle_ui_feedback(
    mut feedback_events: EventReader<ReviewFeedback>,
    mut ui_feedback_state: ResMut<UiFeedbackState>,
) {
    // The last error of the frame wins over plain progress messages.
    let mut last_message: Option<(String, bool)> = None;
    for event in feedback_events.read() {
        let keep_previous = matches!(&last_message, Some((_, true))) && !event.is_error;
        if !keep_previous {
            last_message = Some((event.message.clone(), event.is_error));
        }
    }
    if let Some((msg, is_error)) = last_message {
        if is_error {
            warn!("UI Feedback (Error): {}", msg);
        } else {
            info!("UI Feedback: {}", msg);
        }
        ui_feedback_state.last_message = msg;
        ui_feedback_state.is_error = is_error;
    }
}

/// Clears the feedback line when a new session starts processing.
pub fn clear_ui_feedback_on_session_change(
    session: Res<ReviewSession>,
    mut ui_feedback_state: ResMut<UiFeedbackState>,
    mut last_session: Local<Option<crate::review::resources::SessionId>>,
) {
    let current = session.id();
    if let Some(prev) = *last_session {
        if prev != current && session.has_images() {
            ui_feedback_state.last_message.clear();
            ui_feedback_state.is_error = false;
            trace!("Cleared UI feedback after session change.");
        }
    }
    *last_session = Some(current);
}

static NEXT_SEND_ORDER: AtomicU64 = AtomicU64::new(0);

/// Carries an event from a background task into the ECS; the entity is
/// despawned once the event has been written. Events are forwarded in the
/// order they were created, which entity iteration does not guarantee.
#[derive(Component)]
pub struct SendEvent<E: Event> {
    pub event: E,
    order: u64,
}

impl<E: Event> SendEvent<E> {
    pub fn new(event: E) -> Self {
        Self {
            event,
            order: NEXT_SEND_ORDER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

pub fn forward_events<E: Event + Clone + std::fmt::Debug>(
    mut commands: Commands,
    mut writer: EventWriter<E>,
    query: Query<(Entity, &SendEvent<E>)>,
    mut event_type_name: Local<String>,
) {
    if event_type_name.is_empty() {
        *event_type_name = any::type_name::<E>()
            .split("::")
            .last()
            .unwrap_or("UnknownEvent")
            .to_string();
    }

    let mut pending: Vec<(Entity, &SendEvent<E>)> = query.iter().collect();
    pending.sort_by_key(|(_, send)| send.order);

    let mut count = 0;
    for (entity, send_event_component) in pending {
        count += 1;
        trace!(
            "Forwarding event type '{}' #{}: {:?}",
            *event_type_name,
            count,
            send_event_component.event
        );
        writer.write(send_event_component.event.clone());
        commands.entity(entity).despawn();
    }

    if count > 0 {
        debug!("Forwarded {} instance(s) of event type '{}'.", count, *event_type_name);
    }
}
