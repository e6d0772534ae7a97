use serde::{Deserialize, Serialize};
use std::fmt;

/// One deployment target: platform name, platform version and machine
/// architecture. Serialized as a three element JSON array, e.g.
/// `["ubuntu", "12.04", "x86_64"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTuple(pub String, pub String, pub String);

impl PlatformTuple {
    pub fn new(
        platform: impl Into<String>,
        platform_version: impl Into<String>,
        machine_architecture: impl Into<String>,
    ) -> Self {
        Self(platform.into(), platform_version.into(), machine_architecture.into())
    }

    pub fn platform(&self) -> &str {
        &self.0
    }

    pub fn platform_version(&self) -> &str {
        &self.1
    }

    pub fn machine_architecture(&self) -> &str {
        &self.2
    }

    /// Dash-joined form used in operator messages: `ubuntu-12.04-x86_64`
    pub fn label(&self) -> String {
        format!("{}-{}-{}", self.0, self.1, self.2)
    }

    /// Location of a package uploaded for this platform, relative to the
    /// bucket root: `/ubuntu/12.04/x86_64/foo-1.0.deb`
    pub fn package_location(&self, file_name: &str) -> String {
        format!("/{}/{}/{}/{}", self.0, self.1, self.2, file_name)
    }
}

impl fmt::Display for PlatformTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_from_array() {
        let tuple: PlatformTuple = serde_json::from_str(r#"["el", "6", "i686"]"#).unwrap();

        assert_eq!(tuple.platform(), "el");
        assert_eq!(tuple.platform_version(), "6");
        assert_eq!(tuple.machine_architecture(), "i686");
    }

    #[test]
    fn test_rejects_wrong_arity() {
        assert!(serde_json::from_str::<PlatformTuple>(r#"["el", "6"]"#).is_err());
        assert!(serde_json::from_str::<PlatformTuple>(r#"["el", "6", "i686", "x"]"#).is_err());
    }

    #[test]
    fn test_label_and_location() {
        let tuple = PlatformTuple::new("ubuntu", "12.04", "x86_64");

        assert_eq!(tuple.label(), "ubuntu-12.04-x86_64");
        assert_eq!(tuple.to_string(), "ubuntu-12.04-x86_64");
        assert_eq!(
            tuple.package_location("foo-1.0.deb"),
            "/ubuntu/12.04/x86_64/foo-1.0.deb"
        );
    }
}
