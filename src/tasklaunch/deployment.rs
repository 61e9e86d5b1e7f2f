use std::collections::BTreeMap;

use crate::config::TaskLaunchRequestProperties;
use crate::keyvalue;

/// Deployment properties for the launched task. Malformed pairs are dropped
/// rather than reported.
pub fn resolve_deployment_properties(
    properties: &TaskLaunchRequestProperties,
) -> BTreeMap<String, String> {
    keyvalue::parse(properties.deployment_properties())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str) -> BTreeMap<String, String> {
        resolve_deployment_properties(
            &TaskLaunchRequestProperties::default().with_deployment_properties(raw),
        )
    }

    #[test]
    fn simple_property() {
        let props = resolve("app.sftp.param=value");
        assert_eq!(props.len(), 1);
        assert_eq!(props["app.sftp.param"], "value");
    }

    #[test]
    fn single_property_with_multiple_values() {
        let props = resolve("app.sftp.param=value1,value2");
        assert_eq!(props.len(), 1);
        assert_eq!(props["app.sftp.param"], "value1,value2");
    }

    #[test]
    fn multiple_properties_single_values() {
        let props = resolve("app.sftp.param=value1,app.sftp.other.param=value2");
        assert_eq!(props.len(), 2);
        assert_eq!(props["app.sftp.param"], "value1");
        assert_eq!(props["app.sftp.other.param"], "value2");
    }

    #[test]
    fn unset_is_empty() {
        assert!(resolve_deployment_properties(&TaskLaunchRequestProperties::default()).is_empty());
    }
}
