// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transitions for flows that have not executed their first instruction.

use super::builder::TransitionBuilder;
use super::{started, TransitionContext};
use skein_core::{
    Action, Continuation, Event, ExistingSend, FlowOrigin, FlowState, MachineState, ResumeValue,
    SessionPayload, SessionState, TransitionResult,
};

pub(super) fn transition(
    ctx: &TransitionContext,
    state: &MachineState,
    event: &Event,
) -> TransitionResult {
    let mut b = TransitionBuilder::new(ctx, state);
    match event {
        Event::Start => start(b),

        // Data can land before `Start` runs (the initiator is fast);
        // buffer it exactly as a started flow would.
        Event::MessageReceived {
            session_id,
            payload,
            handler,
        } => {
            started::apply_message(&mut b, *session_id, payload, handler);
            b.finish(Continuation::ProcessEvents)
        }

        Event::Error { error } => {
            b.checkpoint().push_error(error.clone());
            b.finish(Continuation::ProcessEvents)
        }

        Event::RetryFromSafePoint | Event::FlowTimeout => started::retry(b),

        Event::SoftShutdown => b.finish(Continuation::Abort),

        Event::Kill => started::kill(b),

        // Nothing has run, so there is nothing to suspend, finish,
        // propagate, or resume.
        Event::Suspend { .. }
        | Event::InitiateSession { .. }
        | Event::Finished { .. }
        | Event::DeliverSessionEnded { .. }
        | Event::AsyncOpCompleted { .. }
        | Event::SleepFinished
        | Event::StartErrorPropagation
        | Event::Pause => b.finish(Continuation::ProcessEvents),
    }
}

/// Promote `Unstarted → Started`: confirm the initiating peer session (for
/// responder flows), arm the flow timeout, persist, and hand the arguments
/// to the fiber.
fn start(mut b: TransitionBuilder<'_>) -> TransitionResult {
    let origin = b.state.checkpoint.invocation_context.origin.clone();
    if let FlowOrigin::Peer {
        party,
        initiator_session_id,
    } = origin
    {
        // Our half of the session was installed at flow creation; tell the
        // initiator which token to address us by.
        let ours = b
            .state
            .checkpoint
            .checkpoint_state
            .sessions
            .iter()
            .find_map(|(sid, session)| match session {
                SessionState::Initiated {
                    peer_session_id, ..
                } if *peer_session_id == initiator_session_id => Some(*sid),
                _ => None,
            });
        if let Some(our_session_id) = ours {
            let dedup_id = b.allocate_send_dedup();
            b.action(Action::SendExisting {
                send: ExistingSend {
                    peer: party,
                    recipient_session_id: initiator_session_id,
                    payload: SessionPayload::Confirm {
                        initiated_session_id: our_session_id,
                    },
                    dedup_id,
                },
            });
        }
    }

    if b.ctx.timed {
        b.action(Action::ScheduleFlowTimeout { id: b.ctx.id });
    }

    let args = match &b.state.checkpoint.flow_state {
        FlowState::Unstarted { args } => args.clone(),
        _ => serde_json::Value::Null,
    };
    // The durable snapshot stays Unstarted — a crash before the first
    // suspension replays from the very beginning. In memory the flow is
    // promoted: the fiber runs as soon as we return.
    b.commit_checkpoint();
    b.checkpoint().flow_state = FlowState::Started {
        reason: skein_core::SuspendReason::Yield,
        frame: skein_core::FlowFrame::default(),
    };
    b.finish(Continuation::Resume {
        value: ResumeValue::Args { args },
    })
}
