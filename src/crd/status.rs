//! # Crypt Status

use serde::{Deserialize, Serialize};

/// Status of a Crypt resource
///
/// The subresource is declared so the schema is stable, but convergence results are
/// reported through Events rather than written here.
#[allow(clippy::empty_structs_with_brackets, reason = "must serialize as an empty object")]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CryptStatus {}
