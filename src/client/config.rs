//! Client configuration

/// Where a [`HubClient`](super::HubClient) connects and who it claims to be
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP
    pub host: String,
    /// Server port
    pub port: u16,
    /// Path segment(s) before `/<group>/<id>`
    pub path_prefix: String,
    /// Group to join
    pub group: String,
    /// Identity within the group
    pub id: String,
}

impl ClientConfig {
    /// Create a config for `host:port` joining `group` as `id`
    pub fn new(
        host: impl Into<String>,
        port: u16,
        group: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            path_prefix: "ws".to_string(),
            group: group.into(),
            id: id.into(),
        }
    }

    /// Set the path prefix
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// WebSocket URL for this config
    pub fn url(&self) -> String {
        let prefix = self.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("ws://{}:{}/{}/{}", self.host, self.port, self.group, self.id)
        } else {
            format!(
                "ws://{}:{}/{}/{}/{}",
                self.host, self.port, prefix, self.group, self.id
            )
        }
    }
}
