//! Field schemas for the two panel variants.
//!
//! Both panels show the same copilot output (three wrap-up suggestions and
//! four generated texts, each with a confidence score) but live on different
//! host objects with slightly different identifier fields.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::UnsetPolicy;

/// Number of wrap-up suggestion slots on a panel.
pub const WRAP_UP_SLOTS: u8 = 3;

/// The host object a panel is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    VoiceCall,
    Experience,
}

impl PanelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceCall => "voice_call",
            Self::Experience => "experience",
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the generated free-text sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Summary,
    Resolution,
    Reason,
    Followup,
}

impl TextField {
    pub const ALL: [TextField; 4] = [
        TextField::Summary,
        TextField::Resolution,
        TextField::Reason,
        TextField::Followup,
    ];

    fn key(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Resolution => "resolution",
            Self::Reason => "reason",
            Self::Followup => "followup",
        }
    }

    /// Human-facing label, used in headings and toasts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Resolution => "Resolution",
            Self::Reason => "Reason",
            Self::Followup => "Follow-up",
        }
    }

    pub fn text_field(&self) -> String {
        format!("GC_Copilot_{}_text__c", self.key())
    }

    pub fn confidence_field(&self) -> String {
        format!("GC_Copilot_{}_confidence__c", self.key())
    }
}

/// Field names backing one wrap-up suggestion slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapUpFields {
    pub name: String,
    pub confidence: String,
    pub code_id: String,
}

impl WrapUpFields {
    /// Fields for `slot` (1-based), or `None` outside `1..=WRAP_UP_SLOTS`.
    pub fn for_slot(slot: u8) -> Option<Self> {
        if !(1..=WRAP_UP_SLOTS).contains(&slot) {
            return None;
        }
        Some(Self {
            name: format!("GC_Copilot_wrap_up_{slot}_name__c"),
            confidence: format!("GC_Copilot_wrap_up_{slot}_confidence__c"),
            code_id: format!("GC_Copilot_wrap_up_{slot}_id__c"),
        })
    }
}

pub const SESSION_SUMMARY_ID_FIELD: &str = "GC_Copilot_session_summary_id__c";
pub const PARTICIPANT_ID_FIELD: &str = "GC_Copilot_participant_id__c";
pub const AGENT_PARTICIPANT_ID_FIELD: &str = "GC_agent_participant_id__c";
pub const COMMUNICATION_ID_FIELD: &str = "GC_Copilot_communication_id__c";

/// Schema of one panel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelVariant {
    pub kind: PanelKind,
    /// Host object API name, used to qualify fetched fields.
    pub object_name: &'static str,
    pub interaction_id_field: &'static str,
    /// Change-feed channel carrying this object's change events.
    pub channel: &'static str,
    /// How this panel has historically drawn missing confidence scores.
    pub default_unset_policy: UnsetPolicy,
}

impl PanelVariant {
    pub const VOICE_CALL: PanelVariant = PanelVariant {
        kind: PanelKind::VoiceCall,
        object_name: "VoiceCall",
        interaction_id_field: "GC_Interaction_Id__c",
        channel: "/data/VoiceCallChangeEvent",
        default_unset_policy: UnsetPolicy::Maximal,
    };

    pub const EXPERIENCE: PanelVariant = PanelVariant {
        kind: PanelKind::Experience,
        object_name: "genesysps__Experience__c",
        interaction_id_field: "genesysps__Interaction_Id__c",
        channel: "/data/genesysps__Experience__ChangeEvent",
        default_unset_policy: UnsetPolicy::Neutral,
    };

    pub fn for_kind(kind: PanelKind) -> Self {
        match kind {
            PanelKind::VoiceCall => Self::VOICE_CALL,
            PanelKind::Experience => Self::EXPERIENCE,
        }
    }

    /// Bare names of every field the panel reads.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for slot in 1..=WRAP_UP_SLOTS {
            if let Some(w) = WrapUpFields::for_slot(slot) {
                fields.extend([w.name, w.confidence, w.code_id]);
            }
        }
        for text in TextField::ALL {
            fields.push(text.text_field());
            fields.push(text.confidence_field());
        }
        fields.extend(
            [
                self.interaction_id_field,
                PARTICIPANT_ID_FIELD,
                AGENT_PARTICIPANT_ID_FIELD,
                COMMUNICATION_ID_FIELD,
            ]
            .map(String::from),
        );
        fields
    }

    /// `Object.Field` names, the form record fetches expect.
    pub fn qualified_fields(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .map(|f| format!("{}.{f}", self.object_name))
            .collect()
    }

    /// Fields whose change makes the panel's cached record stale: the copilot
    /// output plus the session summary id, but not the identifier fields.
    pub fn relevant_fields(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = BTreeSet::new();
        set.insert(SESSION_SUMMARY_ID_FIELD.to_string());
        for text in TextField::ALL {
            set.insert(text.text_field());
            set.insert(text.confidence_field());
        }
        for slot in 1..=WRAP_UP_SLOTS {
            if let Some(w) = WrapUpFields::for_slot(slot) {
                set.extend([w.name, w.confidence, w.code_id]);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_call_reads_twenty_one_fields() {
        let fields = PanelVariant::VOICE_CALL.fields();
        assert_eq!(fields.len(), 21);
        assert!(fields.contains(&"GC_Copilot_wrap_up_2_id__c".to_string()));
        assert!(fields.contains(&"GC_Interaction_Id__c".to_string()));
    }

    #[test]
    fn qualified_fields_carry_object_prefix() {
        let fields = PanelVariant::EXPERIENCE.qualified_fields();
        assert!(
            fields.contains(&"genesysps__Experience__c.genesysps__Interaction_Id__c".to_string())
        );
        assert!(fields.iter().all(|f| f.starts_with("genesysps__Experience__c.")));
    }

    #[test]
    fn relevant_set_covers_copilot_output_only() {
        let relevant = PanelVariant::VOICE_CALL.relevant_fields();
        assert_eq!(relevant.len(), 18);
        assert!(relevant.contains(SESSION_SUMMARY_ID_FIELD));
        assert!(relevant.contains("GC_Copilot_summary_text__c"));
        assert!(!relevant.contains("GC_Interaction_Id__c"));
        assert!(!relevant.contains(COMMUNICATION_ID_FIELD));
    }

    #[test]
    fn wrap_up_slots_are_one_based() {
        assert!(WrapUpFields::for_slot(0).is_none());
        assert!(WrapUpFields::for_slot(4).is_none());
        assert_eq!(
            WrapUpFields::for_slot(3).unwrap().code_id,
            "GC_Copilot_wrap_up_3_id__c"
        );
    }

    #[test]
    fn variants_differ_in_unset_policy() {
        assert_eq!(
            PanelVariant::for_kind(PanelKind::VoiceCall).default_unset_policy,
            UnsetPolicy::Maximal
        );
        assert_eq!(
            PanelVariant::for_kind(PanelKind::Experience).default_unset_policy,
            UnsetPolicy::Neutral
        );
    }
}
