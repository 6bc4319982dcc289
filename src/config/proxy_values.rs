//! Helm values for the reverse proxy (Traefik chart) in front of the search instance.
//!
//! The proxy obtains TLS certificates from an ACME CA. The resolvers are not
//! structured values in the chart; they are passed as CLI flags through
//! `additionalArguments`, so [`ProxyValues::certificate_resolvers`] parses
//! them back out of those strings before cross-checking them against ports
//! and persistence.

use super::{ConfigError, ConfigIssue, env, read_substituted};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

pub const LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "FATAL", "PANIC"];

const RESOLVER_PREFIX: &str = "--certificatesresolvers.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyValues {
    pub additional_arguments: Vec<String>,
    pub logs: Logs,
    pub ports: BTreeMap<String, PortConfig>,
    pub env_from: Vec<EnvFromSource>,
    pub ingress_route: IngressRoute,
    pub persistence: Persistence,
    pub deployment: Deployment,
    pub ingress_class: IngressClass,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logs {
    pub general: GeneralLogs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralLogs {
    pub level: Option<String>,
}

/// A named entrypoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortConfig {
    pub port: Option<u16>,
    pub exposed_port: Option<u16>,
    /// A bool in older charts, `{default: bool}` in newer ones.
    pub expose: Option<serde_yaml::Value>,
    pub protocol: Option<String>,
    pub redirect_to: Option<RedirectTo>,
    pub tls: Option<PortTls>,
}

/// `redirectTo: {port: websecure}` in current charts, `redirectTo: websecure` in older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RedirectTo {
    Entrypoint { port: String },
    Name(String),
}

impl RedirectTo {
    /// The entrypoint traffic is redirected to.
    pub fn port(&self) -> &str {
        match self {
            RedirectTo::Entrypoint { port } | RedirectTo::Name(port) => port,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortTls {
    pub enabled: bool,
    pub cert_resolver: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvFromSource {
    pub secret_ref: Option<NamedRef>,
    pub config_map_ref: Option<NamedRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressRoute {
    pub dashboard: Dashboard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dashboard {
    pub enabled: bool,
}

impl Default for Dashboard {
    fn default() -> Self {
        // The chart enables the dashboard route unless told otherwise.
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Persistence {
    pub enabled: bool,
    pub name: String,
    pub access_mode: String,
    pub size: String,
    pub path: String,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "data".to_string(),
            access_mode: "ReadWriteOnce".to_string(),
            size: "128Mi".to_string(),
            path: "/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Deployment {
    pub init_containers: Vec<InitContainer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitContainer {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngressClass {
    pub enabled: bool,
    pub is_default_class: bool,
}

/// How the ACME CA verifies domain ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Tls,
    Http { entrypoint: String },
    Dns { provider: String },
}

/// A certificate resolver assembled from `--certificatesresolvers.<name>.acme.*` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateResolver {
    pub name: String,
    pub email: Option<String>,
    pub storage: Option<String>,
    /// Every challenge flag seen; exactly one is valid.
    pub challenges: Vec<Challenge>,
}

impl CertificateResolver {
    pub fn challenge(&self) -> Option<&Challenge> {
        match self.challenges.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

impl ProxyValues {
    /// Load values from a YAML file, substituting `${NAME}` from the environment.
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let (text, unresolved) = read_substituted(path)?;
        let values = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        if !unresolved.is_empty() {
            warn!(?unresolved, "Unset environment variables in proxy values");
        }
        info!(ports = values.ports.len(), "Loaded proxy values");
        Ok(values)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Resolvers declared through `additionalArguments`, in order of first mention.
    pub fn certificate_resolvers(&self) -> Vec<CertificateResolver> {
        let mut resolvers: Vec<CertificateResolver> = Vec::new();

        for arg in &self.additional_arguments {
            let Some(rest) = arg.trim().strip_prefix(RESOLVER_PREFIX) else {
                continue;
            };
            let (key, value) = match rest.split_once('=') {
                Some((k, v)) => (k, v.trim_matches('"').to_string()),
                None => (rest, "true".to_string()),
            };
            let Some((name, setting)) = key.split_once(".acme.") else {
                continue;
            };

            let idx = match resolvers.iter().position(|r| r.name == name) {
                Some(idx) => idx,
                None => {
                    resolvers.push(CertificateResolver {
                        name: name.to_string(),
                        ..Default::default()
                    });
                    resolvers.len() - 1
                }
            };
            let resolver = &mut resolvers[idx];

            match setting {
                "email" => resolver.email = Some(value),
                "storage" => resolver.storage = Some(value),
                "tlschallenge" if value == "true" => resolver.challenges.push(Challenge::Tls),
                "httpchallenge.entrypoint" => {
                    resolver.challenges.push(Challenge::Http { entrypoint: value })
                }
                "dnschallenge.provider" => {
                    resolver.challenges.push(Challenge::Dns { provider: value })
                }
                _ => {}
            }
        }

        resolvers
    }

    /// Cross-check resolvers, ports, logging, secrets and storage.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let resolvers = self.certificate_resolvers();

        for resolver in &resolvers {
            let field = format!("additionalArguments[{}]", resolver.name);
            match resolver.email.as_deref() {
                None | Some("") => {
                    issues.push(ConfigIssue::error(&field, "ACME account email is missing"))
                }
                Some(email) if env::has_placeholder(email) => issues.push(ConfigIssue::error(
                    &field,
                    "ACME account email references an environment variable that is not set",
                )),
                Some(_) => {}
            }
            match resolver.storage.as_deref() {
                None | Some("") => {
                    issues.push(ConfigIssue::error(&field, "ACME storage path is missing"))
                }
                Some(storage) if env::has_placeholder(storage) => {
                    issues.push(ConfigIssue::error(
                        &field,
                        "ACME storage path references an environment variable that is not set",
                    ))
                }
                Some(storage) => {
                    if !self.persistence.enabled {
                        issues.push(ConfigIssue::warning(
                            &field,
                            "persistence is disabled; certificates are lost on restart",
                        ));
                    } else if !path_is_under(storage, &self.persistence.path) {
                        issues.push(ConfigIssue::warning(
                            &field,
                            format!(
                                "storage {storage:?} is outside the persistent volume at {:?}",
                                self.persistence.path
                            ),
                        ));
                    }
                }
            }
            if resolver.challenges.is_empty() {
                issues.push(ConfigIssue::error(&field, "no ACME challenge configured"));
            } else if resolver.challenges.len() > 1 {
                issues.push(ConfigIssue::error(&field, "more than one ACME challenge configured"));
            }
            for challenge in &resolver.challenges {
                if let Challenge::Http { entrypoint } = challenge {
                    if !self.ports.contains_key(entrypoint) {
                        issues.push(ConfigIssue::error(
                            &field,
                            format!("HTTP challenge entrypoint {entrypoint:?} is not a declared port"),
                        ));
                    }
                }
            }
        }

        for (name, port) in &self.ports {
            if let Some(redirect) = &port.redirect_to {
                let target = redirect.port();
                if target == name {
                    issues.push(ConfigIssue::error(
                        format!("ports.{name}.redirectTo"),
                        "redirects to itself",
                    ));
                } else if !self.ports.contains_key(target) {
                    issues.push(ConfigIssue::error(
                        format!("ports.{name}.redirectTo"),
                        format!("unknown port {target:?}"),
                    ));
                }
            }
            if let Some(resolver) = port.tls.as_ref().and_then(|t| t.cert_resolver.as_ref()) {
                if !resolvers.iter().any(|r| &r.name == resolver) {
                    issues.push(ConfigIssue::error(
                        format!("ports.{name}.tls.certResolver"),
                        format!("resolver {resolver:?} is not declared in additionalArguments"),
                    ));
                }
            }
        }

        if let Some(level) = &self.logs.general.level {
            if !LOG_LEVELS.contains(&level.to_uppercase().as_str()) {
                issues.push(ConfigIssue::error(
                    "logs.general.level",
                    format!("unknown level {level:?}"),
                ));
            }
        }

        for (i, source) in self.env_from.iter().enumerate() {
            if let Some(secret) = &source.secret_ref {
                if secret.name.trim().is_empty() {
                    issues.push(ConfigIssue::error(
                        format!("envFrom[{i}].secretRef.name"),
                        "must not be empty",
                    ));
                } else if env::has_placeholder(&secret.name) {
                    issues.push(ConfigIssue::error(
                        format!("envFrom[{i}].secretRef.name"),
                        "references an environment variable that is not set",
                    ));
                }
            }
        }

        if self.persistence.enabled && !resolvers.is_empty() {
            let fixes_permissions = self
                .deployment
                .init_containers
                .iter()
                .any(|c| c.volume_mounts.iter().any(|m| m.name == self.persistence.name));
            if !fixes_permissions {
                issues.push(ConfigIssue::warning(
                    "deployment.initContainers",
                    format!(
                        "no init container mounts volume {:?}; the ACME storage file may keep the wrong permissions",
                        self.persistence.name
                    ),
                ));
            }
        }

        if self.ingress_route.dashboard.enabled {
            issues.push(ConfigIssue::warning(
                "ingressRoute.dashboard.enabled",
                "the dashboard route is exposed",
            ));
        }

        issues
    }
}

/// Whether `path` is `dir` or lies beneath it.
fn path_is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return path.starts_with('/');
    }
    path == dir || path.starts_with(&format!("{dir}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Severity, has_errors};

    const DEPLOYED: &str = r#"
additionalArguments:
  - "--certificatesresolvers.letsencrypt.acme.tlschallenge=true"
  - "--certificatesresolvers.letsencrypt.acme.email=ops@example.com"
  - "--certificatesresolvers.letsencrypt.acme.storage=/data/acme.json"
logs:
  general:
    level: DEBUG
ports:
  web:
    redirectTo:
      port: websecure
  websecure:
    tls:
      enabled: true
      certResolver: letsencrypt
envFrom:
  - secretRef:
      name: traefik-secrets
ingressRoute:
  dashboard:
    enabled: false
persistence:
  enabled: true
  name: data
  accessMode: ReadWriteOnce
  size: 128Mi
  path: /data
deployment:
  initContainers:
    - name: volume-permissions
      image: busybox:latest
      command: ["sh", "-c", "touch /data/acme.json; chmod -v 600 /data/acme.json"]
      volumeMounts:
        - name: data
          mountPath: /data
ingressClass:
  enabled: true
  isDefaultClass: true
"#;

    #[test]
    fn test_parses_deployed_values() {
        let v = ProxyValues::from_yaml(DEPLOYED).unwrap();
        assert_eq!(v.logs.general.level.as_deref(), Some("DEBUG"));
        assert_eq!(v.ports["web"].redirect_to.as_ref().unwrap().port(), "websecure");
        let tls = v.ports["websecure"].tls.as_ref().unwrap();
        assert!(tls.enabled);
        assert_eq!(tls.cert_resolver.as_deref(), Some("letsencrypt"));
        assert_eq!(v.env_from[0].secret_ref.as_ref().unwrap().name, "traefik-secrets");
        assert!(!v.ingress_route.dashboard.enabled);
        assert!(v.persistence.enabled);
        assert_eq!(v.deployment.init_containers[0].volume_mounts[0].mount_path, "/data");
        assert!(v.ingress_class.is_default_class);
        assert!(v.validate().is_empty(), "{:?}", v.validate());
    }

    #[test]
    fn test_certificate_resolvers_are_assembled() {
        let v = ProxyValues::from_yaml(DEPLOYED).unwrap();
        let resolvers = v.certificate_resolvers();
        assert_eq!(resolvers.len(), 1);
        let le = &resolvers[0];
        assert_eq!(le.name, "letsencrypt");
        assert_eq!(le.email.as_deref(), Some("ops@example.com"));
        assert_eq!(le.storage.as_deref(), Some("/data/acme.json"));
        assert_eq!(le.challenge(), Some(&Challenge::Tls));
    }

    #[test]
    fn test_resolver_flag_variants() {
        let v = ProxyValues {
            additional_arguments: vec![
                "--log.level=INFO".to_string(),
                "--certificatesresolvers.staging.acme.httpchallenge.entrypoint=web".to_string(),
                "--certificatesresolvers.cf.acme.dnschallenge.provider=cloudflare".to_string(),
                "--certificatesresolvers.cf.acme.tlschallenge".to_string(),
                "--certificatesresolvers.cf.acme.caserver=https://acme.example/dir".to_string(),
            ],
            ..Default::default()
        };
        let resolvers = v.certificate_resolvers();
        let names: Vec<&str> = resolvers.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["staging", "cf"]);
        assert_eq!(
            resolvers[0].challenge(),
            Some(&Challenge::Http { entrypoint: "web".to_string() })
        );
        assert_eq!(resolvers[1].challenges.len(), 2);
        assert_eq!(resolvers[1].challenge(), None);
    }

    #[test]
    fn test_incomplete_resolver_is_reported() {
        let v = ProxyValues::from_yaml(
            r#"
additionalArguments:
  - "--certificatesresolvers.le.acme.httpchallenge.entrypoint=http"
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let messages: Vec<String> = v.validate().iter().map(|i| i.message.clone()).collect();
        assert!(messages.iter().any(|m| m.contains("email is missing")));
        assert!(messages.iter().any(|m| m.contains("storage path is missing")));
        assert!(messages.iter().any(|m| m.contains("\"http\" is not a declared port")));
    }

    #[test]
    fn test_port_cross_references() {
        let v = ProxyValues::from_yaml(
            r#"
ports:
  web:
    redirectTo:
      port: https
  loop:
    redirectTo:
      port: loop
  websecure:
    tls:
      enabled: true
      certResolver: missing
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let fields: Vec<String> = v.validate().iter().map(|i| i.field.clone()).collect();
        assert_eq!(
            fields,
            vec![
                "ports.loop.redirectTo",
                "ports.web.redirectTo",
                "ports.websecure.tls.certResolver",
            ]
        );
    }

    #[test]
    fn test_redirect_to_accepts_bare_entrypoint_name() {
        let v = ProxyValues::from_yaml(
            r#"
ports:
  web:
    redirectTo: websecure
  websecure:
    port: 8443
  admin:
    redirectTo: nowhere
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        assert_eq!(
            v.ports["web"].redirect_to,
            Some(RedirectTo::Name("websecure".to_string()))
        );
        let issues = v.validate();
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].field, "ports.admin.redirectTo");
        assert!(issues[0].message.contains("\"nowhere\""));
    }

    #[test]
    fn test_unresolved_placeholders_in_resolver_are_errors() {
        let v = ProxyValues::from_yaml(
            r#"
additionalArguments:
  - "--certificatesresolvers.le.acme.tlschallenge=true"
  - "--certificatesresolvers.le.acme.email=${ACME_EMAIL}"
  - "--certificatesresolvers.le.acme.storage=${ACME_STORAGE}"
persistence:
  enabled: true
deployment:
  initContainers:
    - name: volume-permissions
      volumeMounts:
        - name: data
          mountPath: /data
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let issues = v.validate();
        assert_eq!(issues.len(), 2, "{issues:?}");
        assert!(issues.iter().all(|i| i.severity == Severity::Error));
        assert!(issues[0].message.contains("email references an environment variable"));
        assert!(issues[1].message.contains("storage path references an environment variable"));
    }

    #[test]
    fn test_unresolved_secret_ref_name_is_error() {
        let v = ProxyValues::from_yaml(
            r#"
envFrom:
  - secretRef:
      name: ${TRAEFIK_SECRET}
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let issues = v.validate();
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].field, "envFrom[0].secretRef.name");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_load_keeps_unset_placeholder_for_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        std::fs::write(
            &path,
            concat!(
                "additionalArguments:\n",
                "  - \"--certificatesresolvers.le.acme.tlschallenge=true\"\n",
                "  - \"--certificatesresolvers.le.acme.email=${AWFUL_BROWSE_TEST_UNSET_EMAIL}\"\n",
                "  - \"--certificatesresolvers.le.acme.storage=/data/acme.json\"\n",
            ),
        )
        .unwrap();
        let v = ProxyValues::load(path.to_str().unwrap()).unwrap();
        assert_eq!(
            v.certificate_resolvers()[0].email.as_deref(),
            Some("${AWFUL_BROWSE_TEST_UNSET_EMAIL}")
        );
        assert!(has_errors(&v.validate()));
    }

    #[test]
    fn test_storage_and_permissions_warnings() {
        let v = ProxyValues::from_yaml(
            r#"
additionalArguments:
  - "--certificatesresolvers.le.acme.tlschallenge=true"
  - "--certificatesresolvers.le.acme.email=a@b.c"
  - "--certificatesresolvers.le.acme.storage=/certs/acme.json"
persistence:
  enabled: true
  name: data
  path: /data
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let issues = v.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
        assert!(issues[0].message.contains("outside the persistent volume"));
        assert!(issues[1].message.contains("no init container"));
    }

    #[test]
    fn test_log_level_and_secret_ref() {
        let v = ProxyValues::from_yaml(
            r#"
logs:
  general:
    level: verbose
envFrom:
  - secretRef:
      name: ""
ingressRoute:
  dashboard:
    enabled: false
"#,
        )
        .unwrap();
        let issues = v.validate();
        assert!(has_errors(&issues));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].field, "logs.general.level");
        assert_eq!(issues[1].field, "envFrom[0].secretRef.name");
    }

    #[test]
    fn test_dashboard_defaults_to_exposed() {
        let v = ProxyValues::from_yaml("{}").unwrap();
        let issues = v.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "ingressRoute.dashboard.enabled");
    }

    #[test]
    fn test_path_is_under() {
        assert!(path_is_under("/data/acme.json", "/data"));
        assert!(path_is_under("/data/acme.json", "/data/"));
        assert!(path_is_under("/data", "/data"));
        assert!(!path_is_under("/database/acme.json", "/data"));
        assert!(!path_is_under("/certs/acme.json", "/data"));
    }
}
