//! Strimzi Schema Registry operator
//!
//! Runs Confluent Schema Registry instances against a Strimzi-managed Kafka
//! cluster. Strimzi publishes TLS material as PEM; the registry wants JKS
//! key and trust stores. The operator keeps a derived JKS Secret per
//! registry in step with the Strimzi Secrets it comes from and rolls the
//! registry Deployment whenever that Secret is republished.

#![deny(missing_docs)]

/// Operator and per-registry configuration
pub mod config;
/// Shared controller context
pub mod context;
/// Registry controller and Secret watcher
pub mod controller;
/// Controller futures for the binary
pub mod controller_runner;
/// Registry identity and derived names
pub mod identity;
/// JKS store synthesis through keytool and openssl
pub mod keystore;
/// Kubernetes access behind a mockable trait
pub mod kube_client;
/// Kafka bootstrap address resolution
pub mod listener;
/// Deployment and Service templates
pub mod manifests;
/// JKS Secret version reconciliation
pub mod reconciler;
/// Registry membership cache and per-registry locks
pub mod registry_cache;
/// Deployment rollout trigger
pub mod rollout;
/// Strimzi credential sources
pub mod source;
/// Startup tasks
pub mod startup;

pub use context::Context;
