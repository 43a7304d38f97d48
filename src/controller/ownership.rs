//! # Ownership Resolver
//!
//! Maps a deleted target secret back to the Crypt that controls it, so the Crypt
//! can be reconciled again and the secret recreated.

use crate::controller::crypt_key;
use crate::controller::materializer::crypt_owner;
use crate::crd::Crypt;
use crate::runtime::mirror::{Mirror, MirrorError};
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of resolving a deleted secret's owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A live Crypt controls the secret; holds its work-queue key
    Owner(String),
    /// No controller owner reference of kind Crypt
    NotOwned,
    /// The referenced Crypt no longer exists
    Orphan { owner: String },
}

/// Find the live Crypt controlling `secret`
///
/// Every namespace holding a Crypt is checked once, in name order. A Crypt whose
/// uid matches the owner reference wins over one that only matches by name.
pub fn resolve_owner(secret: &Secret, crypts: &Mirror<Crypt>) -> Result<Resolution, MirrorError> {
    let Some(owner) = crypt_owner(secret) else {
        return Ok(Resolution::NotOwned);
    };

    let namespaces: BTreeSet<String> = crypts
        .list()?
        .iter()
        .filter_map(|crypt| crypt.metadata.namespace.clone())
        .collect();

    let mut by_name: Option<Arc<Crypt>> = None;
    for namespace in &namespaces {
        let Some(candidate) = crypts.get(Some(namespace), &owner.name)? else {
            continue;
        };
        if !owner.uid.is_empty() && candidate.metadata.uid.as_deref() == Some(owner.uid.as_str()) {
            return Ok(Resolution::Owner(key_for(&candidate)));
        }
        if by_name.is_none() {
            by_name = Some(candidate);
        }
    }

    Ok(match by_name {
        Some(crypt) => Resolution::Owner(key_for(&crypt)),
        None => Resolution::Orphan {
            owner: owner.name.clone(),
        },
    })
}

fn key_for(crypt: &Crypt) -> String {
    crypt_key(
        crypt.metadata.namespace.as_deref().unwrap_or_default(),
        crypt.metadata.name.as_deref().unwrap_or_default(),
    )
}
