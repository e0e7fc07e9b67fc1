//! JKS store synthesis
//!
//! Converts PEM material into the Java KeyStore files the Schema Registry
//! reads. The conversion is delegated to `keytool` and `openssl` through a
//! [`CommandRunner`]; every intermediate file lives in a temporary directory
//! that is removed when the call returns, on success or failure.
//!
//! - truststore: `keytool -importcert` of the cluster CA under alias `CARoot`
//! - keystore: `openssl pkcs12 -export -chain` of the user cert, key and
//!   clients CA, then `keytool -importkeystore` into JKS

pub mod jks;
pub mod runner;

use std::path::Path;
use std::sync::Arc;

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroizing;

use ssr_common::Error;

pub use runner::{CommandOutput, CommandRunner, TokioCommandRunner};

/// Alias of the cluster CA entry in the truststore
pub const TRUSTSTORE_ALIAS: &str = "CARoot";

/// Alias of the private key entry in the keystore
pub const KEYSTORE_ALIAS: &str = "confluent-schema-registry";

/// Length of generated store passwords
pub const PASSWORD_LENGTH: usize = 24;

const KEYTOOL: &str = "keytool";
const OPENSSL: &str = "openssl";

/// A JKS store and the password protecting it
pub struct GeneratedStore {
    /// Raw JKS bytes
    pub bytes: Vec<u8>,
    /// Store password
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for GeneratedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedStore")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Generate a fresh 24-character alphanumeric password from the OS CSPRNG
pub fn generate_password() -> Zeroizing<String> {
    Zeroizing::new(Alphanumeric.sample_string(&mut OsRng, PASSWORD_LENGTH))
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds JKS stores by driving the external tools
#[derive(Clone)]
pub struct StoreSynthesizer {
    runner: Arc<dyn CommandRunner>,
}

impl StoreSynthesizer {
    /// Create a synthesizer using the given command runner
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Build a truststore holding the cluster CA certificate.
    ///
    /// A random password is generated when `password` is `None`.
    pub async fn create_truststore(
        &self,
        ca_pem: &str,
        password: Option<&str>,
    ) -> Result<GeneratedStore, Error> {
        let password = password
            .map(|p| Zeroizing::new(p.to_string()))
            .unwrap_or_else(generate_password);
        let workdir = scratch_dir()?;

        let cert_path = workdir.path().join("ca.crt");
        write_file(&cert_path, ca_pem.as_bytes()).await?;
        let output_path = workdir.path().join("client.truststore.jks");

        let args = vec![
            "-importcert".to_string(),
            "-keystore".to_string(),
            arg(&output_path),
            "-alias".to_string(),
            TRUSTSTORE_ALIAS.to_string(),
            "-file".to_string(),
            arg(&cert_path),
            "-storepass".to_string(),
            password.to_string(),
            "-storetype".to_string(),
            "jks".to_string(),
            "-trustcacerts".to_string(),
            "-noprompt".to_string(),
        ];
        self.runner.run(KEYTOOL, &args).await?.into_result(KEYTOOL)?;

        let bytes = read_store(&output_path, "truststore", TRUSTSTORE_ALIAS).await?;
        debug!(bytes = bytes.len(), "generated truststore");
        Ok(GeneratedStore { bytes, password })
    }

    /// Build a keystore holding the user's private key and certificate chain.
    ///
    /// A random password is generated when `password` is `None`. The same
    /// password protects the intermediate PKCS#12 file.
    pub async fn create_keystore(
        &self,
        ca_pem: &str,
        cert_pem: &str,
        key_pem: &str,
        password: Option<&str>,
    ) -> Result<GeneratedStore, Error> {
        let password = password
            .map(|p| Zeroizing::new(p.to_string()))
            .unwrap_or_else(generate_password);
        let workdir = scratch_dir()?;

        let ca_path = workdir.path().join("user.ca.crt");
        let cert_path = workdir.path().join("user.crt");
        let key_path = workdir.path().join("user.key");
        write_file(&ca_path, ca_pem.as_bytes()).await?;
        write_file(&cert_path, cert_pem.as_bytes()).await?;
        write_file(&key_path, key_pem.as_bytes()).await?;

        let p12_path = workdir.path().join("user.p12");
        let keystore_path = workdir.path().join("client.keystore.jks");

        let openssl_args = vec![
            "pkcs12".to_string(),
            "-export".to_string(),
            "-in".to_string(),
            arg(&cert_path),
            "-inkey".to_string(),
            arg(&key_path),
            "-chain".to_string(),
            "-CAfile".to_string(),
            arg(&ca_path),
            "-name".to_string(),
            KEYSTORE_ALIAS.to_string(),
            "-passout".to_string(),
            format!("pass:{}", password.as_str()),
            "-out".to_string(),
            arg(&p12_path),
        ];
        self.runner
            .run(OPENSSL, &openssl_args)
            .await?
            .into_result(OPENSSL)?;

        if !path_exists(&p12_path).await? {
            return Err(Error::store_not_produced(
                "user.p12",
                "openssl exited 0 without writing the PKCS#12 bundle",
            ));
        }

        let keytool_args = vec![
            "-importkeystore".to_string(),
            "-deststorepass".to_string(),
            password.to_string(),
            "-destkeystore".to_string(),
            arg(&keystore_path),
            "-deststoretype".to_string(),
            "jks".to_string(),
            "-srckeystore".to_string(),
            arg(&p12_path),
            "-srcstoretype".to_string(),
            "PKCS12".to_string(),
            "-srcstorepass".to_string(),
            password.to_string(),
            "-noprompt".to_string(),
        ];
        self.runner
            .run(KEYTOOL, &keytool_args)
            .await?
            .into_result(KEYTOOL)?;

        let bytes = read_store(&keystore_path, "keystore", KEYSTORE_ALIAS).await?;
        debug!(bytes = bytes.len(), "generated keystore");
        Ok(GeneratedStore { bytes, password })
    }
}

fn scratch_dir() -> Result<tempfile::TempDir, Error> {
    tempfile::Builder::new()
        .prefix("ssr-store-")
        .tempdir()
        .map_err(|e| {
            Error::internal_with_context(
                "synthesizer",
                format!("failed to create temp directory: {}", e),
            )
        })
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), Error> {
    tokio::fs::write(path, contents).await.map_err(|e| {
        Error::internal_with_context(
            "synthesizer",
            format!("failed to write {}: {}", path.display(), e),
        )
    })
}

async fn path_exists(path: &Path) -> Result<bool, Error> {
    tokio::fs::try_exists(path).await.map_err(|e| {
        Error::internal_with_context(
            "synthesizer",
            format!("failed to stat {}: {}", path.display(), e),
        )
    })
}

/// Read a produced store, checking it is a JKS file holding `alias`
async fn read_store(path: &Path, artifact: &str, alias: &str) -> Result<Vec<u8>, Error> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::store_not_produced(
                artifact,
                "keytool exited 0 without writing the store",
            ))
        }
        Err(e) => {
            return Err(Error::internal_with_context(
                "synthesizer",
                format!("failed to read {}: {}", path.display(), e),
            ))
        }
    };
    if !jks::has_jks_magic(&bytes) {
        return Err(Error::store_not_produced(
            artifact,
            format!("output is not a JKS store ({} bytes)", bytes.len()),
        ));
    }
    let entries = jks::inspect(&bytes)
        .map_err(|e| Error::store_not_produced(artifact, format!("unreadable JKS store: {}", e)))?;
    if !entries.iter().any(|e| e.alias.eq_ignore_ascii_case(alias)) {
        return Err(Error::store_not_produced(
            artifact,
            format!("store has no '{}' entry", alias),
        ));
    }
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::jks::tests::{keystore_bytes, truststore_bytes};
    use super::jks::{inspect, JksEntryKind};
    use super::runner::MockCommandRunner;
    use super::*;

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn path_after(args: &[String], flag: &str) -> PathBuf {
        let idx = args
            .iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("missing {} in {:?}", flag, args));
        PathBuf::from(&args[idx + 1])
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    fn ok() -> CommandOutput {
        CommandOutput {
            status: Some(0),
            ..Default::default()
        }
    }

    fn synthesizer(mock: MockCommandRunner) -> StoreSynthesizer {
        StoreSynthesizer::new(Arc::new(mock))
    }

    /// Mock runner that behaves like keytool and openssl for the happy path
    pub(crate) fn fake_tools() -> MockCommandRunner {
        fake_tools_counted().0
    }

    /// Like [`fake_tools`], also counting invocations
    pub(crate) fn fake_tools_counted() -> (MockCommandRunner, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(move |program, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            match (program, args[0].as_str()) {
                ("keytool", "-importcert") => {
                    std::fs::write(path_after(args, "-keystore"), truststore_bytes(&["caroot"]))
                        .unwrap();
                }
                ("openssl", "pkcs12") => {
                    std::fs::write(path_after(args, "-out"), b"PKCS12").unwrap();
                }
                ("keytool", "-importkeystore") => {
                    std::fs::write(
                        path_after(args, "-destkeystore"),
                        keystore_bytes("confluent-schema-registry", 2),
                    )
                    .unwrap();
                }
                other => panic!("unexpected invocation {:?}", other),
            }
            Ok(ok())
        });
        (mock, count)
    }

    #[test]
    fn generated_passwords_are_fresh_alphanumeric() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), PASSWORD_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(*a, *b);
    }

    #[tokio::test]
    async fn truststore_imports_ca_under_root_alias() {
        let seen_pem = Arc::new(Mutex::new(String::new()));
        let seen = seen_pem.clone();

        let mut mock = MockCommandRunner::new();
        mock.expect_run().times(1).returning(move |program, args| {
            assert_eq!(program, "keytool");
            assert_eq!(value_after(args, "-alias"), "CARoot");
            assert_eq!(value_after(args, "-storepass"), "test1234");
            assert_eq!(value_after(args, "-storetype"), "jks");
            assert!(args.iter().any(|a| a == "-trustcacerts"));
            assert!(args.iter().any(|a| a == "-noprompt"));
            *seen.lock().unwrap() = std::fs::read_to_string(path_after(args, "-file")).unwrap();
            std::fs::write(path_after(args, "-keystore"), truststore_bytes(&["caroot"])).unwrap();
            Ok(ok())
        });

        let store = synthesizer(mock)
            .create_truststore("CA PEM", Some("test1234"))
            .await
            .unwrap();
        assert_eq!(store.password.as_str(), "test1234");
        assert_eq!(*seen_pem.lock().unwrap(), "CA PEM");

        let entries = inspect(&store.bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].alias.eq_ignore_ascii_case(TRUSTSTORE_ALIAS));
    }

    #[tokio::test]
    async fn keystore_packages_chain_then_converts() {
        let calls = Arc::new(Mutex::new(Vec::<(String, Vec<String>)>::new()));
        let recorded = calls.clone();

        let mut mock = MockCommandRunner::new();
        mock.expect_run().times(2).returning(move |program, args| {
            recorded
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            match program {
                "openssl" => std::fs::write(path_after(args, "-out"), b"PKCS12").unwrap(),
                _ => std::fs::write(
                    path_after(args, "-destkeystore"),
                    keystore_bytes("confluent-schema-registry", 2),
                )
                .unwrap(),
            }
            Ok(ok())
        });

        let store = synthesizer(mock)
            .create_keystore("CLIENTS CA", "USER CERT", "USER KEY", None)
            .await
            .unwrap();
        assert_eq!(store.password.len(), PASSWORD_LENGTH);

        let calls = calls.lock().unwrap();
        let (first, openssl_args) = &calls[0];
        let (second, keytool_args) = &calls[1];
        assert_eq!(first, "openssl");
        assert_eq!(second, "keytool");
        assert!(openssl_args.iter().any(|a| a == "-chain"));
        assert_eq!(value_after(openssl_args, "-name"), KEYSTORE_ALIAS);
        assert_eq!(
            value_after(openssl_args, "-passout"),
            format!("pass:{}", store.password.as_str())
        );
        assert_eq!(
            value_after(keytool_args, "-srckeystore"),
            value_after(openssl_args, "-out")
        );
        assert_eq!(value_after(keytool_args, "-srcstoretype"), "PKCS12");
        assert_eq!(value_after(keytool_args, "-deststorepass"), store.password.as_str());

        let entries = inspect(&store.bytes).unwrap();
        assert_eq!(entries[0].kind, JksEntryKind::PrivateKey { chain_length: 2 });
    }

    #[tokio::test]
    async fn repeated_calls_use_independent_passwords() {
        let synth = synthesizer(fake_tools());
        let a = synth.create_truststore("CA", None).await.unwrap();
        let b = synth.create_truststore("CA", None).await.unwrap();
        assert_ne!(*a.password, *b.password);
        assert!(!a.bytes.is_empty());
    }

    /// Story: keytool says it succeeded but wrote nothing
    ///
    /// This means the tool or its environment is broken, not that the
    /// inputs were bad. It is reported as StoreNotProduced, which the
    /// controller does not retry quickly.
    #[tokio::test]
    async fn story_zero_exit_without_output_is_store_not_produced() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, _| Ok(ok()));

        let err = synthesizer(mock)
            .create_truststore("CA", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StoreNotProduced { ref artifact, .. } if artifact == "truststore"
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_pkcs12_stops_before_keytool() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .times(1)
            .returning(|program, _| {
                assert_eq!(program, "openssl");
                Ok(ok())
            });

        let err = synthesizer(mock)
            .create_keystore("CA", "CERT", "KEY", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StoreNotProduced { ref artifact, .. } if artifact == "user.p12"
        ));
    }

    #[tokio::test]
    async fn non_jks_output_is_store_not_produced() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, args| {
            std::fs::write(path_after(args, "-keystore"), b"not a keystore").unwrap();
            Ok(ok())
        });

        let err = synthesizer(mock)
            .create_truststore("CA", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a JKS store"));
    }

    #[tokio::test]
    async fn store_without_expected_alias_is_rejected() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, args| {
            std::fs::write(path_after(args, "-keystore"), truststore_bytes(&["mykey"])).unwrap();
            Ok(ok())
        });

        let err = synthesizer(mock)
            .create_truststore("CA", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StoreNotProduced { ref artifact, .. } if artifact == "truststore"
        ));
        assert!(err.to_string().contains("CARoot"));
    }

    #[tokio::test]
    async fn tool_failure_carries_output_and_cleans_up() {
        let workdir = Arc::new(Mutex::new(None::<PathBuf>));
        let seen = workdir.clone();

        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(move |_, args| {
            let cert = path_after(args, "-file");
            *seen.lock().unwrap() = cert.parent().map(Path::to_path_buf);
            Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "keytool error: java.lang.Exception: Input not an X.509 certificate"
                    .to_string(),
            })
        });

        let err = synthesizer(mock)
            .create_truststore("garbage", None)
            .await
            .unwrap_err();
        match err {
            Error::ExternalToolFailure {
                program,
                status,
                stderr,
                ..
            } => {
                assert_eq!(program, "keytool");
                assert_eq!(status, Some(1));
                assert!(stderr.contains("X.509"));
            }
            other => panic!("expected ExternalToolFailure, got {:?}", other),
        }

        let dir = workdir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "temp dir {} was not removed", dir.display());
    }

    mod real_tools {
        use super::*;
        use std::process::Command;

        fn openssl(args: &[&str]) {
            let status = Command::new("openssl").args(args).status().unwrap();
            assert!(status.success(), "openssl {:?} failed", args);
        }

        /// Self-signed CA plus a user certificate signed by it
        fn pki() -> (String, String, String) {
            let dir = tempfile::tempdir().unwrap();
            let p = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

            openssl(&[
                "req", "-x509", "-newkey", "rsa:2048", "-nodes", "-days", "1", "-subj",
                "/CN=test-ca", "-keyout", &p("ca.key"), "-out", &p("ca.crt"),
            ]);
            openssl(&[
                "req", "-newkey", "rsa:2048", "-nodes", "-subj", "/CN=registry", "-keyout",
                &p("user.key"), "-out", &p("user.csr"),
            ]);
            openssl(&[
                "x509", "-req", "-days", "1", "-in", &p("user.csr"), "-CA", &p("ca.crt"),
                "-CAkey", &p("ca.key"), "-CAcreateserial", "-out", &p("user.crt"),
            ]);

            let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
            (read("ca.crt"), read("user.crt"), read("user.key"))
        }

        #[tokio::test]
        #[ignore = "requires keytool and openssl on PATH; run with --ignored"]
        async fn truststore_from_real_ca() {
            let (ca, _, _) = pki();
            let synth = StoreSynthesizer::new(Arc::new(TokioCommandRunner));
            let store = synth.create_truststore(&ca, Some("test1234")).await.unwrap();

            assert!(!store.bytes.is_empty());
            let entries = inspect(&store.bytes).unwrap();
            assert_eq!(entries.len(), 1);
            assert!(entries[0].alias.eq_ignore_ascii_case(TRUSTSTORE_ALIAS));
            assert_eq!(entries[0].kind, JksEntryKind::TrustedCertificate);
        }

        #[tokio::test]
        #[ignore = "requires keytool and openssl on PATH; run with --ignored"]
        async fn keystore_from_real_credentials() {
            let (ca, cert, key) = pki();
            let synth = StoreSynthesizer::new(Arc::new(TokioCommandRunner));
            let store = synth.create_keystore(&ca, &cert, &key, None).await.unwrap();

            let entries = inspect(&store.bytes).unwrap();
            assert_eq!(entries.len(), 1);
            assert!(entries[0].alias.eq_ignore_ascii_case(KEYSTORE_ALIAS));
            assert!(matches!(
                entries[0].kind,
                JksEntryKind::PrivateKey { chain_length } if chain_length >= 1
            ));
        }
    }
}
