//! Run completion detection and final output projection.

use weft_context::compose_object;
use weft_trace::TraceEventKind;

use crate::error::ErrorKind;
use crate::plan::Decision;
use crate::planner::{mapping_entries, Pass};

/// Complete the run if no active token remains.
///
/// Active means any non-terminal status — a token waiting at a fan-in
/// keeps its sibling group unresolved and therefore keeps the run open.
pub(crate) fn check_completion(pass: &mut Pass) {
    if pass.terminal {
        return;
    }
    if pass.tokens.iter().any(|t| t.status.is_active()) {
        return;
    }

    // Project the final result from one consistent final view.
    let snapshot = pass.ctx.snapshot(None, &mut pass.rec);
    let entries = mapping_entries(&pass.definition.output_mapping);
    let (final_output, skipped) = match compose_object(&entries, &snapshot) {
        Ok(projected) => projected,
        Err(err) => {
            pass.fail_run(ErrorKind::InvalidPath, err.to_string(), None, None, None);
            return;
        }
    };
    for (dest, source) in skipped {
        pass.rec.push(TraceEventKind::OutputMappingSkip { dest, source });
    }

    if let Err(err) = weft_schema::check(&pass.definition.output_schema, &final_output) {
        pass.fail_run(
            ErrorKind::SchemaViolation,
            format!("final output: {err}"),
            None,
            None,
            None,
        );
        return;
    }
    pass.rec.push(TraceEventKind::ContextValidate {
        subtree: "output".into(),
    });

    pass.rec.push(TraceEventKind::CompletionComplete {
        final_output: final_output.clone(),
    });
    pass.decisions.push(Decision::CompleteRun { final_output });
    pass.terminal = true;
}
