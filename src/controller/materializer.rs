//! # Secret Materializer
//!
//! Builds the desired target secret for one (definition, namespace, payload)
//! triple. Writes are full replacements, so anything added to a target out of
//! band is dropped on the next update.

use crate::constants::DEFAULT_SECRET_TYPE;
use crate::crd::{Crypt, SecretDefinition};
use crate::store::Payload;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::Resource;

/// Controller owner reference pointing at `crypt`
pub fn owner_reference(crypt: &Crypt) -> OwnerReference {
    OwnerReference {
        api_version: Crypt::api_version(&()).into_owned(),
        kind: Crypt::kind(&()).into_owned(),
        name: crypt.metadata.name.clone().unwrap_or_default(),
        uid: crypt.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Target name: the definition's, else the payload's declared name
pub fn target_name<'a>(definition: &'a SecretDefinition, payload: &'a Payload) -> Option<&'a str> {
    definition
        .target_name()
        .or_else(|| Some(payload.name.as_str()).filter(|n| !n.is_empty()))
}

/// Secret type: the definition's override, else the payload's, else `Opaque`
pub fn target_type<'a>(definition: &'a SecretDefinition, payload: &'a Payload) -> &'a str {
    definition
        .type_override()
        .or_else(|| payload.declared_type())
        .unwrap_or(DEFAULT_SECRET_TYPE)
}

/// Build the desired target secret, or `None` when no name can be derived
pub fn materialize(
    crypt: &Crypt,
    definition: &SecretDefinition,
    namespace: &str,
    payload: &Payload,
) -> Option<Secret> {
    let name = target_name(definition, payload)?;

    Some(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: definition.labels.clone(),
            annotations: definition.annotations.clone(),
            owner_references: Some(vec![owner_reference(crypt)]),
            ..ObjectMeta::default()
        },
        type_: Some(target_type(definition, payload).to_string()),
        data: Some(payload.data.clone()),
        ..Secret::default()
    })
}

/// The controller owner reference on `secret`, if it is a Crypt
pub fn crypt_owner(secret: &Secret) -> Option<&OwnerReference> {
    secret
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true))
        .filter(|owner| owner.kind == Crypt::kind(&()))
}

/// True if `secret` is controlled by exactly this `crypt`
pub fn is_controlled_by(secret: &Secret, crypt: &Crypt) -> bool {
    let Some(owner) = crypt_owner(secret) else {
        return false;
    };
    if owner.name != crypt.metadata.name.as_deref().unwrap_or_default() {
        return false;
    }
    match crypt.metadata.uid.as_deref() {
        Some(uid) if !owner.uid.is_empty() => owner.uid == uid,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CryptSpec;
    use std::collections::BTreeMap;

    fn crypt() -> Crypt {
        let mut crypt = Crypt::new("test-crypt", CryptSpec::default());
        crypt.metadata.namespace = Some("default".to_string());
        crypt.metadata.uid = Some("uid-1".to_string());
        crypt
    }

    #[test]
    fn test_materialize_copies_payload_and_sets_owner() {
        let crypt = crypt();
        let mut definition = SecretDefinition::new("test-foo-secret", "test/foo");
        definition.labels = Some(BTreeMap::from([("app".to_string(), "web".to_string())]));
        let payload = Payload::new("foo").with_field("foo", "fooSecret");

        let secret = materialize(&crypt, &definition, "test-ns1", &payload).unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("test-foo-secret"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("test-ns1"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(secret.data.as_ref().unwrap()["foo"].0, b"fooSecret".to_vec());
        assert_eq!(secret.metadata.labels.as_ref().unwrap()["app"], "web");

        let owners = secret.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].api_version, "crypt.io/v1alpha1");
        assert_eq!(owners[0].kind, "Crypt");
        assert_eq!(owners[0].name, "test-crypt");
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_name_falls_back_to_payload() {
        let definition = SecretDefinition {
            key: "test/foo".to_string(),
            ..SecretDefinition::default()
        };
        let payload = Payload::new("from-store");
        assert_eq!(target_name(&definition, &payload), Some("from-store"));

        let unnamed = Payload::default();
        assert_eq!(target_name(&definition, &unnamed), None);
        assert!(materialize(&crypt(), &definition, "ns", &unnamed).is_none());
    }

    #[test]
    fn test_type_precedence() {
        let mut definition = SecretDefinition::new("x", "k");
        let mut payload = Payload::new("x");
        assert_eq!(target_type(&definition, &payload), "Opaque");

        payload.secret_type = Some("kubernetes.io/dockerconfigjson".to_string());
        assert_eq!(target_type(&definition, &payload), "kubernetes.io/dockerconfigjson");

        definition.type_ = Some("kubernetes.io/tls".to_string());
        assert_eq!(target_type(&definition, &payload), "kubernetes.io/tls");
    }

    #[test]
    fn test_ownership_checks() {
        let crypt = crypt();
        let definition = SecretDefinition::new("s", "k");
        let secret = materialize(&crypt, &definition, "ns", &Payload::new("s")).unwrap();

        assert!(crypt_owner(&secret).is_some());
        assert!(is_controlled_by(&secret, &crypt));

        let mut recreated = crypt.clone();
        recreated.metadata.uid = Some("uid-2".to_string());
        assert!(!is_controlled_by(&secret, &recreated));

        let mut other = crypt.clone();
        other.metadata.name = Some("other".to_string());
        assert!(!is_controlled_by(&secret, &other));

        assert!(crypt_owner(&Secret::default()).is_none());
    }
}
