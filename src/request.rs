//! Inbound request model.
//!
//! The transport layer hands the engine a [`MockRequest`]; everything
//! downstream reads from it and never mutates it.

use std::collections::HashMap;

/// Prefix under which mocked applications are mounted.
pub const MOUNT_PREFIX: &str = "/mock/rest/project/";

/// An HTTP-style request as seen by the engine.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub project: String,
    pub application: String,
    pub method: String,
    /// Path relative to the application mount point
    pub path: String,
    pub query: QueryParams,
    /// Header names are stored lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scheme: Option<String>,
}

impl MockRequest {
    pub fn new(
        project: impl Into<String>,
        application: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            application: application.into(),
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a request from a full mount URL path such as
    /// `/mock/rest/project/p1/application/a1/users/7`.
    pub fn from_mount_path(method: impl Into<String>, full_path: &str) -> Option<Self> {
        let mount = split_mount_path(full_path)?;
        Some(Self::new(mount.project, mount.application, method, mount.path))
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = QueryParams::parse(query);
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Host name from the explicit host, falling back to the Host header.
    pub fn host_name(&self) -> Option<String> {
        if let Some(host) = &self.host {
            return Some(host.clone());
        }
        let header = self.header("host")?;
        Some(header.split(':').next().unwrap_or(header).to_string())
    }

    /// Port from the explicit port, the Host header, or the scheme default.
    pub fn port_number(&self) -> Option<u16> {
        if self.port.is_some() {
            return self.port;
        }
        if let Some(port) = self
            .header("host")
            .and_then(|h| h.rsplit_once(':'))
            .and_then(|(_, p)| p.parse().ok())
        {
            return Some(port);
        }
        match self.scheme.as_deref() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        }
    }
}

/// Ordered, multi-valued query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for part in query.split('&') {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            params.push(decode_component(key), decode_component(value));
        }

        params
    }

    pub fn push(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Project, application and endpoint-relative path parsed from a mount URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MountPath {
    pub project: String,
    pub application: String,
    pub path: String,
}

/// Split `/mock/rest/project/{project}/application/{application}/...`.
pub fn split_mount_path(full_path: &str) -> Option<MountPath> {
    let rest = full_path.strip_prefix(MOUNT_PREFIX)?;
    let (project, rest) = rest.split_once('/')?;
    let rest = rest.strip_prefix("application/")?;
    let (application, path) = match rest.split_once('/') {
        Some((application, path)) => (application, format!("/{}", path)),
        None => (rest, "/".to_string()),
    };
    if project.is_empty() || application.is_empty() {
        return None;
    }
    Some(MountPath {
        project: project.to_string(),
        application: application.to_string(),
        path,
    })
}
