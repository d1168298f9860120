//! Signed-request / trusted-response client for the Alipay open platform
//! gateway.
//!
//! This crate builds canonical parameter sets, signs them with the merchant's
//! RSA key, optionally AES-encrypts the business payload, sends them through
//! an [`transport::HttpTransport`], and verifies the gateway's signed
//! responses, either against a configured public key or against keys pinned
//! per gateway certificate serial.
//!
//! # Modules
//!
//! - [`cert`]: X.509 parsing, certificate serials and root chain checks
//! - [`client`]: The request executor and its four execution modes
//! - [`constants`]: Protocol field names and defaults
//! - [`domain`]: Business models used by the engine itself
//! - [`error`]: Error types and error handling utilities
//! - [`key_manager`]: Certificate trust cache and refresh protocol
//! - [`logging`]: Logger initialization
//! - [`params`]: Canonical parameter sets and file attachments
//! - [`parser`]: Response envelope parsing and signable fragment extraction
//! - [`request`]: Request capabilities and business payload serialization
//! - [`response`]: Response envelope type
//! - [`settings`]: Configuration management and validation
//! - [`signature`]: RSA signing and verification, AES payload encryption
//! - [`templates`]: Handlebars template for auto-submitting page forms
//! - [`test_support`]: Testing utilities and mocks
//! - [`transport`]: HTTP transport trait and the reqwest implementation
//! - [`verifier`]: Response and notification signature checks

pub mod cert;
pub mod client;
pub mod constants;
pub mod domain;
pub mod error;
pub mod key_manager;
pub mod logging;
pub mod params;
pub mod parser;
pub mod request;
pub mod response;
pub mod settings;
pub mod signature;
pub mod templates;
pub mod transport;
pub mod verifier;
