//! Heuristic session analysis.
//!
//! A deliberately coarse rule layer, not a vision system: every rule is
//! evaluated independently over the Session value alone and all applicable
//! issues are included.

use chrono::Utc;
use emuloop_proto::{Analysis, Session, SessionStatus};

/// Minimum plausible screenshot size; below this the capture is likely blank.
const MIN_CAPTURE_BYTES: u64 = 1000;
/// Ceiling above which a capture is suspiciously large.
const MAX_CAPTURE_BYTES: u64 = 20_000_000;

/// Derives an [`Analysis`] from a completed session. Pure: inspects only the
/// session value.
pub fn analyze(session: &Session) -> Analysis {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if session.captures.is_empty() {
        issues.push("No captures taken".to_string());
        recommendations.push("Check screen capture permissions".to_string());
    }

    match session.status {
        SessionStatus::Error => {
            let detail = session.error.as_deref().unwrap_or("unknown");
            issues.push(format!("Emulator error: {detail}"));
        }
        SessionStatus::ForceKilled
        | SessionStatus::EmulatorExitedEarly
        | SessionStatus::ProgramNotFound => {
            issues.push(format!("Session ended with status {}", session.status.as_str()));
        }
        SessionStatus::Completed | SessionStatus::Unknown => {}
    }

    if contains_error_marker(&session.emulator_stdout)
        || contains_error_marker(&session.emulator_stderr)
    {
        issues.push("Emulator reported errors".to_string());
    }

    for capture in &session.captures {
        if capture.size_bytes < MIN_CAPTURE_BYTES {
            issues.push(format!("Capture {} is unusually small", capture.step));
        } else if capture.size_bytes > MAX_CAPTURE_BYTES {
            issues.push(format!("Capture {} is unusually large", capture.step));
        }
    }

    Analysis {
        session_id: session.session_id.clone(),
        timestamp: Utc::now(),
        captures_analyzed: session.captures.len() as u32,
        issues,
        recommendations,
    }
}

fn contains_error_marker(text: &str) -> bool {
    text.to_lowercase().contains("error")
}
