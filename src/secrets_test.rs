use super::*;

// =============================================================================
// Test sources
// =============================================================================

struct MapSource {
    kind: CredentialSource,
    values: HashMap<String, String>,
}

impl MapSource {
    fn new(kind: CredentialSource, pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { kind, values }
    }
}

impl SecretSource for MapSource {
    fn kind(&self) -> CredentialSource {
        self.kind
    }

    fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).cloned())
    }
}

struct BrokenStore;

impl SecretSource for BrokenStore {
    fn kind(&self) -> CredentialSource {
        CredentialSource::DeploymentSecret
    }

    fn lookup(&self, _name: &str) -> Result<Option<String>, SecretError> {
        Err(SecretError::Unreadable("corrupt".into()))
    }
}

fn deployment(pairs: &[(&str, &str)]) -> Box<dyn SecretSource> {
    Box::new(MapSource::new(CredentialSource::DeploymentSecret, pairs))
}

fn local(pairs: &[(&str, &str)]) -> Box<dyn SecretSource> {
    Box::new(MapSource::new(CredentialSource::LocalEnvironment, pairs))
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("corpus-chat-secrets-{}-{name}", uuid::Uuid::new_v4()))
}

// =============================================================================
// resolve — source priority
// =============================================================================

#[test]
fn deployment_secret_wins_over_environment() {
    let resolver = SecretResolver::new(vec![deployment(&[("KEY", "from-store")]), local(&[("KEY", "from-env")])]);
    let cred = resolver.resolve("KEY").unwrap();
    assert_eq!(cred.expose(), "from-store");
    assert_eq!(cred.source(), CredentialSource::DeploymentSecret);
}

#[test]
fn environment_used_when_store_lacks_key() {
    let resolver = SecretResolver::new(vec![deployment(&[("OTHER", "x")]), local(&[("KEY", "from-env")])]);
    let cred = resolver.resolve("KEY").unwrap();
    assert_eq!(cred.expose(), "from-env");
    assert_eq!(cred.source(), CredentialSource::LocalEnvironment);
}

#[test]
fn blank_store_value_falls_through() {
    let resolver = SecretResolver::new(vec![deployment(&[("KEY", "   ")]), local(&[("KEY", "from-env")])]);
    assert_eq!(resolver.resolve("KEY").unwrap().expose(), "from-env");
}

#[test]
fn broken_store_falls_back_to_environment() {
    let resolver = SecretResolver::new(vec![Box::new(BrokenStore), local(&[("KEY", "from-env")])]);
    assert_eq!(resolver.resolve("KEY").unwrap().expose(), "from-env");
}

#[test]
fn both_sources_empty_resolves_absent() {
    let resolver = SecretResolver::new(vec![deployment(&[]), local(&[])]);
    assert!(resolver.resolve("KEY").is_none());
}

#[test]
fn broken_store_and_empty_env_resolves_absent() {
    let resolver = SecretResolver::new(vec![Box::new(BrokenStore), local(&[])]);
    assert!(resolver.resolve("KEY").is_none());
}

#[test]
fn resolved_value_is_trimmed() {
    let resolver = SecretResolver::new(vec![local(&[("KEY", "  sk-123\n")])]);
    assert_eq!(resolver.resolve("KEY").unwrap().expose(), "sk-123");
}

#[test]
fn credential_debug_redacts_value() {
    let cred = Credential::new("super-secret", CredentialSource::LocalEnvironment);
    let debug = format!("{cred:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("redacted"));
}

// =============================================================================
// SecretsFile
// =============================================================================

#[test]
fn secrets_file_missing_is_unavailable() {
    let store = SecretsFile::new(temp_path("missing.yaml"));
    assert!(matches!(store.lookup("KEY"), Err(SecretError::Unavailable(_))));
}

#[test]
fn secrets_file_reads_mapping() {
    let path = temp_path("ok.yaml");
    std::fs::write(&path, "GROQ_API_KEY: gsk_abc\nRETRIES: 3\n").unwrap();
    let store = SecretsFile::new(&path);
    assert_eq!(store.lookup("GROQ_API_KEY").unwrap().as_deref(), Some("gsk_abc"));
    assert_eq!(store.lookup("RETRIES").unwrap().as_deref(), Some("3"));
    assert!(store.lookup("NOPE").unwrap().is_none());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn secrets_file_malformed_is_unreadable() {
    let path = temp_path("bad.yaml");
    std::fs::write(&path, "- just\n- a list\n").unwrap();
    let store = SecretsFile::new(&path);
    assert!(matches!(store.lookup("KEY"), Err(SecretError::Unreadable(_))));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn parse_secrets_yaml_empty_is_ok() {
    assert!(parse_secrets_yaml("").unwrap().is_empty());
}

#[test]
fn parse_secrets_yaml_skips_nested_values() {
    let map = parse_secrets_yaml("A: one\nB:\n  nested: two\nC: true\n").unwrap();
    assert_eq!(map.get("A").map(String::as_str), Some("one"));
    assert!(!map.contains_key("B"));
    assert_eq!(map.get("C").map(String::as_str), Some("true"));
}

// =============================================================================
// standard resolver against the process environment
// =============================================================================

// Cargo exports CARGO_PKG_NAME to every test binary it runs.
#[test]
fn standard_resolver_reads_process_environment_without_secrets_file() {
    let resolver = SecretResolver::standard(temp_path("absent.yaml"));
    let credential = resolver.resolve("CARGO_PKG_NAME").unwrap();
    assert_eq!(credential.expose(), env!("CARGO_PKG_NAME"));
    assert_eq!(credential.source(), CredentialSource::LocalEnvironment);
}

#[test]
fn standard_resolver_prefers_secrets_file_over_environment() {
    let path = temp_path("override.yaml");
    std::fs::write(&path, "CARGO_PKG_NAME: from-file\n").unwrap();
    let credential = SecretResolver::standard(&path).resolve("CARGO_PKG_NAME").unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(credential.expose(), "from-file");
    assert_eq!(credential.source(), CredentialSource::DeploymentSecret);
}

#[test]
fn standard_resolver_misses_unset_variable() {
    let name = format!("CORPUS_CHAT_UNSET_{}", uuid::Uuid::new_v4().simple());
    assert!(SecretResolver::standard(temp_path("absent.yaml")).resolve(&name).is_none());
}
