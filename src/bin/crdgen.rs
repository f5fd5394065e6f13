//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of the provider as a multi-document
//! YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > package/crds.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use provider_cards::crd::{Deck, ProviderConfig, ProviderConfigUsage};

fn main() -> anyhow::Result<()> {
    let crds = [
        ProviderConfig::crd(),
        ProviderConfigUsage::crd(),
        Deck::crd(),
    ];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
