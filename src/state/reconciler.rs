use super::transcript::TranscriptStore;
use crate::types::{CycleId, ExecutionResult, Fingerprint, Fragment, Message, MessagePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Duplicate,
}

/// What the orchestrator should do with a completed fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionDecision {
    Ignored(IgnoreReason),
    /// New content: run it in the sandbox, then record the reply.
    Execute(Fragment),
}

/// Exactly-once bookkeeping between stream completion and sandbox execution.
#[derive(Debug, Default)]
pub struct FragmentReconciler {
    last_fingerprint: Option<Fingerprint>,
    pending: Option<CycleId>,
    fragment: Option<Fragment>,
    result: Option<ExecutionResult>,
    preview_loading: bool,
    last_execution_error: Option<String>,
}

impl FragmentReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(&mut self, cycle: CycleId, fragment: Fragment) -> CompletionDecision {
        if fragment.is_empty() {
            return CompletionDecision::Ignored(IgnoreReason::Empty);
        }

        let fingerprint = fragment.fingerprint();
        if self.last_fingerprint.as_ref() == Some(&fingerprint) {
            return CompletionDecision::Ignored(IgnoreReason::Duplicate);
        }

        self.last_fingerprint = Some(fingerprint);
        self.pending = Some(cycle);
        self.fragment = Some(fragment.clone());
        self.preview_loading = true;
        CompletionDecision::Execute(fragment)
    }

    /// A failed execution keeps whatever result was already shown.
    pub fn on_execution_finished(&mut self, outcome: Result<ExecutionResult, String>) {
        match outcome {
            Ok(result) => {
                self.result = Some(result);
                self.last_execution_error = None;
            }
            Err(message) => self.last_execution_error = Some(message),
        }
        self.pending = None;
        self.preview_loading = false;
    }

    /// Drops the in-flight execution. The fingerprint stays recorded, so the
    /// same fragment never reaches the sandbox twice.
    pub fn abandon_pending(&mut self) -> bool {
        if self.pending.take().is_none() {
            return false;
        }
        self.preview_loading = false;
        true
    }

    /// Forgets the preview and any in-flight execution, keeping the fingerprint.
    pub fn reset(&mut self) {
        self.pending = None;
        self.preview_loading = false;
        self.fragment = None;
        self.result = None;
    }

    /// Replaces the assistant message of `cycle` when it is last, otherwise appends one.
    pub fn merge_assistant_message(
        transcript: &mut TranscriptStore,
        cycle: CycleId,
        fragment: Fragment,
    ) -> usize {
        let last = transcript.len().checked_sub(1);
        match last {
            Some(index)
                if transcript
                    .last_message()
                    .is_some_and(|message| message.is_assistant_of(cycle)) =>
            {
                transcript.replace_at(
                    index,
                    MessagePatch {
                        content: Some(fragment.assistant_content()),
                        fragment: Some(fragment),
                        ..MessagePatch::default()
                    },
                );
                index
            }
            _ => transcript.append(Message::assistant(fragment, cycle)),
        }
    }

    pub fn set_preview(&mut self, fragment: Option<Fragment>, result: Option<ExecutionResult>) {
        self.fragment = fragment;
        self.result = result;
    }

    pub fn close_preview(&mut self) {
        self.fragment = None;
        self.result = None;
    }

    pub fn is_executing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_cycle(&self) -> Option<CycleId> {
        self.pending
    }

    pub fn fragment(&self) -> Option<&Fragment> {
        self.fragment.as_ref()
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }

    pub fn preview_loading(&self) -> bool {
        self.preview_loading
    }

    pub fn last_execution_error(&self) -> Option<&str> {
        self.last_execution_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, Role};

    fn fragment(code: &str) -> Fragment {
        Fragment {
            commentary: Some("Here you go".to_string()),
            code: Some(code.to_string()),
            template: Some("nextjs-developer".to_string()),
            ..Fragment::default()
        }
    }

    fn result(id: &str) -> ExecutionResult {
        serde_json::from_value(serde_json::json!({
            "sbxId": id,
            "template": "nextjs-developer",
            "url": "https://example.test"
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_fragment_is_ignored() {
        let mut reconciler = FragmentReconciler::new();
        assert_eq!(
            reconciler.on_complete(CycleId(1), Fragment::default()),
            CompletionDecision::Ignored(IgnoreReason::Empty)
        );
        assert!(!reconciler.preview_loading());
    }

    #[test]
    fn test_duplicate_completion_in_same_cycle_executes_once() {
        let mut reconciler = FragmentReconciler::new();
        assert!(matches!(
            reconciler.on_complete(CycleId(1), fragment("a")),
            CompletionDecision::Execute(_)
        ));
        assert!(reconciler.preview_loading());
        assert_eq!(
            reconciler.on_complete(CycleId(1), fragment("a")),
            CompletionDecision::Ignored(IgnoreReason::Duplicate)
        );
    }

    #[test]
    fn test_same_content_in_new_cycle_is_ignored() {
        let mut reconciler = FragmentReconciler::new();
        reconciler.on_complete(CycleId(1), fragment("a"));
        reconciler.on_execution_finished(Ok(result("sbx-1")));

        assert_eq!(
            reconciler.on_complete(CycleId(2), fragment("a")),
            CompletionDecision::Ignored(IgnoreReason::Duplicate)
        );
        assert!(!reconciler.is_executing());
        assert!(!reconciler.preview_loading());
        assert_eq!(reconciler.result().map(|r| r.sbx_id.as_str()), Some("sbx-1"));
    }

    #[test]
    fn test_failed_execution_keeps_prior_result() {
        let mut reconciler = FragmentReconciler::new();
        reconciler.on_complete(CycleId(1), fragment("a"));
        reconciler.on_execution_finished(Ok(result("sbx-1")));

        reconciler.on_complete(CycleId(2), fragment("b"));
        reconciler.on_execution_finished(Err("sandbox down".to_string()));

        assert!(!reconciler.preview_loading());
        assert!(!reconciler.is_executing());
        assert_eq!(reconciler.result().map(|r| r.sbx_id.as_str()), Some("sbx-1"));
        assert_eq!(reconciler.last_execution_error(), Some("sandbox down"));
        assert_eq!(reconciler.fragment(), Some(&fragment("b")));
    }

    #[test]
    fn test_abandon_pending_keeps_fingerprint() {
        let mut reconciler = FragmentReconciler::new();
        reconciler.on_complete(CycleId(1), fragment("a"));
        assert!(reconciler.abandon_pending());
        assert!(!reconciler.abandon_pending());
        assert!(!reconciler.preview_loading());

        assert_eq!(
            reconciler.on_complete(CycleId(2), fragment("a")),
            CompletionDecision::Ignored(IgnoreReason::Duplicate)
        );
        assert!(matches!(
            reconciler.on_complete(CycleId(2), fragment("b")),
            CompletionDecision::Execute(_)
        ));
    }

    #[test]
    fn test_merge_replaces_only_same_cycle_assistant() {
        let mut transcript = TranscriptStore::new();
        transcript.append(Message::user(vec![ContentPart::text("hi")]));

        let first = FragmentReconciler::merge_assistant_message(
            &mut transcript,
            CycleId(1),
            fragment("a"),
        );
        let again = FragmentReconciler::merge_assistant_message(
            &mut transcript,
            CycleId(1),
            fragment("b"),
        );
        assert_eq!(first, 1);
        assert_eq!(again, 1);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[1].content[1], ContentPart::code("b"));

        let next = FragmentReconciler::merge_assistant_message(
            &mut transcript,
            CycleId(2),
            fragment("c"),
        );
        assert_eq!(next, 2);
        assert_eq!(transcript.messages()[2].role, Role::Assistant);
    }

    #[test]
    fn test_reset_and_close_preview() {
        let mut reconciler = FragmentReconciler::new();
        reconciler.on_complete(CycleId(1), fragment("a"));
        reconciler.on_execution_finished(Ok(result("sbx-1")));

        reconciler.close_preview();
        assert!(reconciler.fragment().is_none());
        assert!(reconciler.result().is_none());

        reconciler.set_preview(Some(fragment("a")), Some(result("sbx-1")));
        reconciler.on_complete(CycleId(2), fragment("b"));
        reconciler.reset();
        assert!(reconciler.fragment().is_none());
        assert!(reconciler.result().is_none());
        assert!(!reconciler.is_executing());
        assert!(!reconciler.preview_loading());
        assert_eq!(
            reconciler.on_complete(CycleId(3), fragment("b")),
            CompletionDecision::Ignored(IgnoreReason::Duplicate)
        );
    }
}
