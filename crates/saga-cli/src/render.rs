//! Terminal rendering of session events.

use std::io::Write;

use saga_core::SagaEvent;

/// Text to show for an event: `(stdout, stderr)`.
pub fn render(event: &SagaEvent) -> (Option<String>, Option<String>) {
    match event {
        SagaEvent::OutputDelta { delta, .. } => (Some(delta.clone()), None),
        SagaEvent::TurnComplete { truncated, .. } => {
            let tail = if *truncated { "\n(interrupted)\n" } else { "\n" };
            (Some(tail.to_string()), None)
        }
        SagaEvent::InputQueued { position, .. } => {
            (None, Some(format!("(queued, position {position})")))
        }
        SagaEvent::InputsDiscarded { inputs, .. } => {
            (None, Some(format!("(discarded {} queued inputs)", inputs.len())))
        }
        SagaEvent::RecoveryStarted { attempt, .. } => (
            None,
            Some(format!("(reconnecting to the narrator, attempt {attempt})")),
        ),
        SagaEvent::CompactionStarted { entries_to_archive, .. } => (
            None,
            Some(format!("(archiving {entries_to_archive} old passages)")),
        ),
        SagaEvent::CompactionComplete {
            success: true,
            size_before,
            size_after,
            ..
        } => (
            None,
            Some(format!("(history condensed: {size_before} -> {size_after} chars)")),
        ),
        SagaEvent::Error {
            code,
            message,
            retryable,
            ..
        } => {
            let hint = if *retryable { " (try again)" } else { "" };
            (None, Some(format!("[{code}] {message}{hint}")))
        }
        _ => (None, None),
    }
}

/// Write an event to the terminal.
pub fn print_event(event: &SagaEvent) {
    let (out, err) = render(event);
    if let Some(text) = out {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
    if let Some(text) = err {
        eprintln!("{text}");
    }
}
