//! # CRD Generator
//!
//! Prints the `Crypt` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crypt.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use crypt_controller::crd::Crypt;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Crypt::crd())?);
    Ok(())
}
