use crate::{Effect, Msg, PageStage, RunState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, Vec<Effect>) {
    let effects = match msg {
        Msg::Listed { total } => {
            state.total = Some(total);
            Vec::new()
        }
        Msg::PageStarted { page_id, title } => {
            state.start_page(page_id, title);
            Vec::new()
        }
        Msg::StageChanged { page_id, stage } => transition(&mut state, &page_id, stage)
            .err()
            .into_iter()
            .collect(),
        Msg::Warning { page_id, message } => match state.record_mut(&page_id) {
            Some(record) => {
                record.warnings.push(message);
                Vec::new()
            }
            None => vec![Effect::UnknownPage { page_id }],
        },
        Msg::PageWritten { page_id, file } => {
            if let Err(effect) = transition(&mut state, &page_id, PageStage::Written) {
                return (state, vec![effect]);
            }
            if let Some(record) = state.record_mut(&page_id) {
                record.file = Some(file);
            }
            state.consecutive_write_failures = 0;
            Vec::new()
        }
        Msg::PageFailed {
            page_id,
            stage,
            reason,
        } => {
            if !stage.is_failure() {
                let from = state.page(&page_id).map(|r| r.stage).unwrap_or_default();
                return (
                    state,
                    vec![Effect::RejectedTransition {
                        page_id,
                        from,
                        to: stage,
                    }],
                );
            }
            if let Err(effect) = transition(&mut state, &page_id, stage) {
                return (state, vec![effect]);
            }
            if let Some(record) = state.record_mut(&page_id) {
                record.failure = Some(reason);
            }
            if stage == PageStage::WriteFailed {
                note_write_failure(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::ListingInterrupted { reason } => {
            state.listing_error = Some(reason);
            Vec::new()
        }
    };

    (state, effects)
}

fn transition(state: &mut RunState, page_id: &str, next: PageStage) -> Result<(), Effect> {
    let Some(record) = state.record_mut(page_id) else {
        return Err(Effect::UnknownPage {
            page_id: page_id.to_string(),
        });
    };
    match record.stage.advance(next) {
        Ok(stage) => {
            record.stage = stage;
            Ok(())
        }
        Err(invalid) => Err(Effect::RejectedTransition {
            page_id: page_id.to_string(),
            from: invalid.from,
            to: invalid.to,
        }),
    }
}

fn note_write_failure(state: &mut RunState) -> Vec<Effect> {
    state.consecutive_write_failures += 1;
    let limit = state.max_consecutive_write_failures;
    if limit == 0 || state.consecutive_write_failures < limit || state.aborted.is_some() {
        return Vec::new();
    }
    let reason = format!("{limit} consecutive write failures; output location looks unusable");
    state.aborted = Some(reason.clone());
    vec![Effect::AbortRun { reason }]
}
