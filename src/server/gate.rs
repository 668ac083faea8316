//! Decides whether server-backed browsing is allowed in this deployment.
//!
//! An explicit switch always wins. Without one, development servers accept
//! requests that clearly come from localhost, and otherwise the host itself
//! has to look like a local machine.

use std::net::ToSocketAddrs;
use std::path::Path;

use axum::http::HeaderMap;
use serde::Serialize;

use crate::config::AppConfig;

/// Minimum score for a host or request to count as local.
const LOCAL_SCORE: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Parse an on/off word the way `ENABLE_LOCAL_FS` is written.
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Facts about the host the server runs on.
#[derive(Debug, Clone)]
pub struct Environment {
    pub development: bool,
    pub hostname: String,
    pub has_loopback: bool,
    pub enable_local_fs: Option<bool>,
}

impl Environment {
    pub fn detect(config: &AppConfig) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        let has_loopback = ("localhost", 0)
            .to_socket_addrs()
            .map(|mut addrs| addrs.any(|a| a.ip().is_loopback()))
            .unwrap_or(false);
        Self {
            development: config.is_development(),
            hostname,
            has_loopback,
            enable_local_fs: config.enable_local_fs(),
        }
    }

    fn mode_name(&self) -> &'static str {
        if self.development {
            "development"
        } else {
            "production"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub local: bool,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

fn switch_reason(enabled: bool) -> String {
    if enabled {
        "Explicitly enabled by ENABLE_LOCAL_FS".to_string()
    } else {
        "Explicitly disabled by ENABLE_LOCAL_FS".to_string()
    }
}

/// Score the host environment.
pub fn assess_environment(env: &Environment) -> Assessment {
    let mut reasons = Vec::new();
    let mut score = 0;

    match env.enable_local_fs {
        Some(false) => {
            return Assessment {
                local: false,
                confidence: Confidence::High,
                reasons: vec![switch_reason(false)],
            }
        }
        Some(true) => {
            score += 10;
            reasons.push(switch_reason(true));
        }
        None => {}
    }

    if env.development {
        score += 3;
        reasons.push("Running in development mode".to_string());
    } else {
        score -= 5;
        reasons.push("Running in production mode (default: disabled)".to_string());
    }

    let host = env.hostname.as_str();
    if host == "localhost" || host == "127.0.0.1" {
        score += 5;
        reasons.push(format!("Hostname is {host}"));
    } else if host.contains("local") || host.contains("DESKTOP-") {
        score += 2;
        reasons.push(format!("Hostname suggests local: {host}"));
    } else {
        reasons.push(format!("Hostname is {host} (may be username/machine name)"));
    }

    if env.has_loopback {
        score += 3;
        reasons.push("Has loopback interface (127.0.0.1)".to_string());
    }

    let confidence = if env.enable_local_fs.is_some() {
        Confidence::High
    } else if env.development && host == "localhost" {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Assessment {
        local: score >= LOCAL_SCORE,
        confidence,
        reasons,
    }
}

fn is_localhost(value: &str) -> bool {
    value.contains("localhost") || value.contains("127.0.0.1")
}

fn is_private_192(host: &str) -> bool {
    let octets: Vec<&str> = host.split(['.', ':']).collect();
    octets.len() >= 4
        && octets[0] == "192"
        && octets[1] == "168"
        && octets[2..4].iter().all(|o| o.parse::<u8>().is_ok())
}

fn is_private_other(host: &str) -> bool {
    let octets: Vec<&str> = host.split(['.', ':']).collect();
    if octets.len() < 4 || !octets[1..4].iter().all(|o| o.parse::<u8>().is_ok()) {
        return false;
    }
    match (octets[0], octets[1].parse::<u8>()) {
        ("10", _) => true,
        ("172", Ok(second)) => (16..=31).contains(&second),
        _ => false,
    }
}

/// Score where a request seems to come from, from its Host, Origin and
/// Referer headers.
pub fn assess_request(headers: &HeaderMap) -> Assessment {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let host = header("host");
    let origin = header("origin");
    let referer = header("referer");

    let mut reasons = Vec::new();
    let mut score = 0;

    if is_localhost(&host) {
        score += 10;
        reasons.push(format!("Host header is localhost: {host}"));
    } else if is_private_192(&host) {
        score += 3;
        reasons.push(format!("Host is private IP: {host}"));
    } else if is_private_other(&host) {
        score += 2;
        reasons.push(format!("Host is private IP range: {host}"));
    } else if !host.is_empty() {
        score -= 1;
        reasons.push(format!("Host header: {host}"));
    }

    let local_origin = !origin.is_empty() && is_localhost(&origin);
    if local_origin {
        score += 5;
        reasons.push(format!("Origin header is localhost: {origin}"));
    } else if !origin.is_empty() {
        reasons.push(format!("Origin header: {origin}"));
    }

    if !referer.is_empty() && is_localhost(&referer) {
        score += 2;
        let shown: String = referer.chars().take(50).collect();
        reasons.push(format!("Referer is localhost: {shown}..."));
    }

    let localhost = is_localhost(&host) || local_origin;
    let confidence = if localhost {
        Confidence::High
    } else if score >= LOCAL_SCORE {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Assessment {
        local: localhost || score >= LOCAL_SCORE,
        confidence,
        reasons,
    }
}

/// Final verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

/// Body of the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub available: bool,
    pub confidence: Confidence,
    pub environment: String,
    pub hostname: String,
    pub enable_local_fs: Option<bool>,
    pub files_directory: String,
    pub reasons: Vec<String>,
    pub request_reasons: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    env: Environment,
}

impl AccessGate {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Gate that always allows.
    #[cfg(test)]
    pub fn open() -> Self {
        Self::new(Environment {
            development: true,
            hostname: "localhost".to_string(),
            has_loopback: true,
            enable_local_fs: Some(true),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Evaluate access, optionally taking the request's headers into account.
    pub fn evaluate(&self, headers: Option<&HeaderMap>) -> Decision {
        let env_check = assess_environment(&self.env);

        if let Some(enabled) = self.env.enable_local_fs {
            let mut reasons = vec![switch_reason(enabled)];
            reasons.extend(env_check.reasons);
            return Decision {
                allowed: enabled,
                confidence: Confidence::High,
                reasons,
            };
        }

        let request_check = headers.map(assess_request);

        if self.env.development {
            if let Some(req) = &request_check {
                if req.local && req.confidence >= Confidence::Medium {
                    let label = match req.confidence {
                        Confidence::High => "high",
                        _ => "medium",
                    };
                    let mut reasons = vec![format!(
                        "Development mode + localhost request ({label} confidence)"
                    )];
                    reasons.extend(env_check.reasons);
                    reasons.extend(req.reasons.iter().cloned());
                    return Decision {
                        allowed: true,
                        confidence: req.confidence,
                        reasons,
                    };
                }
            }
        }

        if env_check.local {
            return Decision {
                allowed: true,
                confidence: env_check.confidence,
                reasons: env_check.reasons,
            };
        }

        let mut reasons = env_check.reasons;
        if let Some(req) = request_check {
            reasons.extend(req.reasons);
        }
        reasons.push("Environment check failed or request not from localhost".to_string());
        Decision {
            allowed: false,
            confidence: Confidence::Medium,
            reasons,
        }
    }

    pub fn status(&self, headers: &HeaderMap, files_directory: &Path) -> GateStatus {
        let env_check = assess_environment(&self.env);
        let decision = self.evaluate(Some(headers));
        let message = if decision.allowed {
            "Server mode is available"
        } else {
            "Server mode is disabled for security reasons"
        };
        GateStatus {
            available: decision.allowed,
            confidence: decision.confidence,
            environment: self.env.mode_name().to_string(),
            hostname: self.env.hostname.clone(),
            enable_local_fs: self.env.enable_local_fs,
            files_directory: files_directory.to_string_lossy().to_string(),
            reasons: env_check.reasons,
            request_reasons: decision.reasons,
            message: message.to_string(),
        }
    }
}
