//! Read-only credential view for a student identity.

use serde::{Deserialize, Serialize};

use soulmint_core::{ContractReader, CoreError, CoreResult, Identifier, MetadataSource, TokenId};

use crate::config::NetworkConfig;

/// Attributes beyond this many are dropped when metadata is parsed.
pub const MAX_ATTRIBUTES: usize = 12;

pub const DEFAULT_CREDENTIAL_NAME: &str = "Soulbound credential";

const IPFS_SCHEME: &str = "ipfs://";

/// Rewrite an `ipfs://` URI onto an HTTP gateway. Other URIs pass through.
pub fn resolve_uri(uri: &str, gateway: &str) -> String {
    match uri.strip_prefix(IPFS_SCHEME) {
        Some(path) => {
            let path = path.strip_prefix("ipfs/").unwrap_or(path);
            format!("{}/{}", gateway.trim_end_matches('/'), path)
        }
        None => uri.to_string(),
    }
}

/// Explorer page listing `holder`'s tokens on `contract`.
pub fn explorer_url(explorer: &str, contract: &Identifier, holder: &Identifier) -> String {
    format!(
        "{}/token/{}?a={}",
        explorer.trim_end_matches('/'),
        contract,
        holder
    )
}

/// `wallet_watchAsset` request asking the wallet to track the credential.
pub fn watch_asset_request(contract: &Identifier, token_id: TokenId) -> serde_json::Value {
    serde_json::json!({
        "method": "wallet_watchAsset",
        "params": {
            "type": "ERC721",
            "options": {
                "address": contract.as_str(),
                "tokenId": token_id.to_string(),
            },
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    #[serde(default)]
    pub trait_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Token metadata document. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub attributes: Vec<MetadataAttribute>,
}

/// Accepts a missing, null or non-array `attributes` field, and skips
/// entries that are not objects.
fn lenient_attributes<'de, D>(deserializer: D) -> Result<Vec<MetadataAttribute>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let items = match raw {
        serde_json::Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .take(MAX_ATTRIBUTES)
        .collect())
}

impl CredentialMetadata {
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_CREDENTIAL_NAME)
    }

    pub fn image_url(&self, gateway: &str) -> Option<String> {
        self.image.as_deref().map(|i| resolve_uri(i, gateway))
    }
}

/// An active credential as the student sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialCard {
    pub holder: Identifier,
    pub token_id: TokenId,
    pub token_uri: Option<String>,
    /// `token_uri` rewritten through the gateway.
    pub metadata_url: Option<String>,
    pub explorer_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialView {
    NotConnected,
    NoCredential,
    Active(CredentialCard),
}

/// Look up the credential held by `holder`, if any.
pub async fn load_view(
    reader: &dyn ContractReader,
    holder: Option<&Identifier>,
    network: &NetworkConfig,
) -> CoreResult<CredentialView> {
    let holder = match holder {
        Some(h) => h,
        None => return Ok(CredentialView::NotConnected),
    };

    let token_id = match reader.token_id_of(holder).await? {
        Some(id) => id,
        None => {
            tracing::debug!(holder = %holder, "no active credential");
            return Ok(CredentialView::NoCredential);
        }
    };

    let token_uri = reader.token_uri(token_id).await?;
    let metadata_url = token_uri
        .as_deref()
        .map(|u| resolve_uri(u, &network.ipfs_gateway));
    let contract = Identifier::parse(&network.contract_address)?;

    tracing::debug!(holder = %holder, token_id = %token_id, "credential found");
    Ok(CredentialView::Active(CredentialCard {
        holder: holder.clone(),
        token_id,
        token_uri,
        metadata_url,
        explorer_url: explorer_url(&network.explorer_url, &contract, holder),
    }))
}

/// Fetch and parse the card's metadata. A card without a URI has none.
pub async fn load_metadata(
    source: &dyn MetadataSource,
    card: &CredentialCard,
) -> CoreResult<Option<CredentialMetadata>> {
    let url = match &card.metadata_url {
        Some(url) => url,
        None => return Ok(None),
    };
    let bytes = source.fetch(url).await?;
    CredentialMetadata::parse(&bytes).map(Some)
}
