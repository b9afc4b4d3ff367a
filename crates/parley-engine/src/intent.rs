//! Case-filing intent: which signals count, and the typed decision the orchestrator acts on.

use parley_core::{CaseTrigger, ConversationConfig};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseDecision {
    /// Run the filing saga now.
    File,
    /// Requested, but this session already has a case.
    AlreadyOpen,
    NotRequested,
}

/// Raw signals gathered for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentSignals {
    pub phrase: bool,
    pub directive: bool,
    pub analysis: bool,
}

#[derive(Debug, Clone)]
pub struct CasePolicy {
    triggers: Vec<CaseTrigger>,
    phrases: Vec<String>,
}

impl CasePolicy {
    pub fn new(triggers: Vec<CaseTrigger>, phrases: Vec<String>) -> Self {
        let phrases = phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { triggers, phrases }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.case_triggers.clone(), config.case_phrases.clone())
    }

    fn enabled(&self, trigger: CaseTrigger) -> bool {
        self.triggers.contains(&trigger)
    }

    /// Case-insensitive substring match against the configured phrases.
    pub fn phrase_matches(&self, utterance: &str) -> bool {
        let lowered = utterance.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Whether a separate intent call is worth making for this turn.
    pub fn wants_analysis(&self, signals: IntentSignals, case_opened: bool) -> bool {
        self.enabled(CaseTrigger::Analyze) && !case_opened && !self.requested(signals)
    }

    fn requested(&self, s: IntentSignals) -> bool {
        (self.enabled(CaseTrigger::Phrase) && s.phrase)
            || (self.enabled(CaseTrigger::Directive) && s.directive)
            || (self.enabled(CaseTrigger::Analyze) && s.analysis)
    }

    pub fn decide(&self, signals: IntentSignals, case_opened: bool) -> CaseDecision {
        if !self.requested(signals) {
            CaseDecision::NotRequested
        } else if case_opened {
            CaseDecision::AlreadyOpen
        } else {
            CaseDecision::File
        }
    }
}

/// Read a YES/NO answer from the intent call. Anything other than a leading yes is no.
pub fn parse_yes_no(raw: &str) -> bool {
    raw.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_uppercase()
        .starts_with("YES")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> CasePolicy {
        CasePolicy::from_config(&ConversationConfig::default())
    }

    #[test]
    fn phrase_or_directive_triggers_by_default() {
        let policy = default_policy();
        assert!(policy.phrase_matches("Could you Open A Case for me?"));
        let phrase = IntentSignals {
            phrase: true,
            ..Default::default()
        };
        let directive = IntentSignals {
            directive: true,
            ..Default::default()
        };
        assert_eq!(policy.decide(phrase, false), CaseDecision::File);
        assert_eq!(policy.decide(directive, false), CaseDecision::File);
        assert_eq!(
            policy.decide(IntentSignals::default(), false),
            CaseDecision::NotRequested
        );
    }

    #[test]
    fn at_most_one_case_per_session() {
        let policy = default_policy();
        let phrase = IntentSignals {
            phrase: true,
            directive: true,
            ..Default::default()
        };
        assert_eq!(policy.decide(phrase, true), CaseDecision::AlreadyOpen);
    }

    #[test]
    fn disabled_triggers_are_ignored() {
        let policy = CasePolicy::new(vec![CaseTrigger::Analyze], vec!["open a case".into()]);
        let phrase_only = IntentSignals {
            phrase: true,
            ..Default::default()
        };
        assert_eq!(policy.decide(phrase_only, false), CaseDecision::NotRequested);
        assert!(policy.wants_analysis(phrase_only, false));
        assert!(!policy.wants_analysis(phrase_only, true));

        let analysed = IntentSignals {
            analysis: true,
            ..Default::default()
        };
        assert_eq!(policy.decide(analysed, false), CaseDecision::File);
        assert!(!default_policy().wants_analysis(IntentSignals::default(), false));
    }

    #[test]
    fn yes_no_parsing() {
        assert!(parse_yes_no("YES"));
        assert!(parse_yes_no(" yes."));
        assert!(parse_yes_no("\"Yes\""));
        assert!(!parse_yes_no("NO"));
        assert!(!parse_yes_no("maybe yes"));
    }
}
