use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Launch request for a task managed by a data flow platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLaunchRequest {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "deploymentProps", default)]
    pub deployment_props: BTreeMap<String, String>,
}

/// Launch request for a task started directly from its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandaloneLaunchRequest {
    pub resource_uri: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment_props: BTreeMap<String, String>,
    #[serde(default)]
    pub deployment_props: BTreeMap<String, String>,
    pub application_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LaunchRequest {
    Standalone(StandaloneLaunchRequest),
    Platform(PlatformLaunchRequest),
}

impl LaunchRequest {
    pub fn args(&self) -> &[String] {
        match self {
            LaunchRequest::Platform(request) => &request.args,
            LaunchRequest::Standalone(request) => &request.args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Platform,
    Standalone,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchMode::Platform => f.write_str("platform"),
            LaunchMode::Standalone => f.write_str("standalone"),
        }
    }
}

pub const PLATFORM_FUNCTION_NAME: &str = "dataflowTaskLaunchRequest";
pub const STANDALONE_FUNCTION_NAME: &str = "standaloneTaskLaunchRequest";
pub const GENERIC_FUNCTION_NAME: &str = "taskLaunchRequest";

/// Launch request flavour implied by the active function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchRequestType {
    Dataflow,
    Standalone,
    None,
}

impl LaunchRequestType {
    pub fn from_definition(definition: &str) -> Self {
        if definition.contains(PLATFORM_FUNCTION_NAME) {
            LaunchRequestType::Dataflow
        } else if definition.contains(STANDALONE_FUNCTION_NAME) {
            LaunchRequestType::Standalone
        } else {
            LaunchRequestType::None
        }
    }

    pub fn mode(self) -> Option<LaunchMode> {
        match self {
            LaunchRequestType::Dataflow => Some(LaunchMode::Platform),
            LaunchRequestType::Standalone => Some(LaunchMode::Standalone),
            LaunchRequestType::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn platform_request_keeps_empty_collections_on_the_wire() {
        let request = PlatformLaunchRequest {
            name: "foo".to_string(),
            args: Vec::new(),
            deployment_props: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "name": "foo", "args": [], "deploymentProps": {} })
        );
    }

    #[test]
    fn untagged_decoding_tells_variants_apart() {
        let platform: LaunchRequest =
            serde_json::from_value(json!({ "name": "foo", "args": ["a=1"], "deploymentProps": {} }))
                .unwrap();
        assert!(matches!(platform, LaunchRequest::Platform(_)));

        let standalone: LaunchRequest = serde_json::from_value(json!({
            "resourceUri": "maven://t",
            "args": [],
            "environmentProps": {},
            "deploymentProps": {},
            "applicationName": "t"
        }))
        .unwrap();
        assert!(matches!(standalone, LaunchRequest::Standalone(_)));
    }

    #[test]
    fn definition_selects_type() {
        assert_eq!(
            LaunchRequestType::from_definition("enrich|dataflowTaskLaunchRequest"),
            LaunchRequestType::Dataflow
        );
        assert_eq!(
            LaunchRequestType::from_definition("standaloneTaskLaunchRequest"),
            LaunchRequestType::Standalone
        );
        assert_eq!(
            LaunchRequestType::from_definition("timeSource"),
            LaunchRequestType::None
        );
    }
}
