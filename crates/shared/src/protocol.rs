use serde::{Deserialize, Serialize};

use crate::domain::GroundingLink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceRef {
    pub title: String,
    pub uri: String,
}

/// One grounding chunk attached to an agent reply. Only chunks with a
/// `maps` place reference are turned into links and resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<PlaceRef>,
}

impl GroundingResult {
    pub fn place(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            maps: Some(PlaceRef {
                title: title.into(),
                uri: uri.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub text: String,
    #[serde(default)]
    pub grounding_results: Vec<GroundingResult>,
}

impl AgentReply {
    pub fn places(&self) -> impl Iterator<Item = &PlaceRef> {
        self.grounding_results
            .iter()
            .filter_map(|chunk| chunk.maps.as_ref())
    }

    pub fn grounding_links(&self) -> Vec<GroundingLink> {
        self.places()
            .map(|place| GroundingLink {
                title: place.title.clone(),
                uri: place.uri.clone(),
            })
            .collect()
    }
}
