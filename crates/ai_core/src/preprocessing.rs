//! Fitted preprocessing state shipped alongside the inference artifact
//!
//! Embedding rows are positional and scaled features depend on the exact
//! fitted means, so serving must use these files rather than refitting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::encoder::IdentityEncoder;
use crate::errors::{CoreError, Result};
use crate::features::{
    extract_item_features, extract_user_features, ITEM_FEATURE_DIM, USER_FEATURE_DIM,
};
use crate::records::{ItemRecord, UserRecord};
use crate::scaler::FeatureScaler;
use crate::serialization::{read_json_file, write_canonical_file};

pub const USER_SCALER_FILE: &str = "user_scaler.json";
pub const ITEM_SCALER_FILE: &str = "item_scaler.json";
pub const USER_ENCODER_FILE: &str = "user_encoder.json";
pub const ITEM_ENCODER_FILE: &str = "item_encoder.json";

/// An identity resolved to its table row plus its scaled feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedEntity {
    pub index: usize,
    pub features: Vec<f32>,
}

/// Scalers and encoders for both towers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessing {
    pub user_scaler: FeatureScaler,
    pub item_scaler: FeatureScaler,
    pub user_encoder: IdentityEncoder,
    pub item_encoder: IdentityEncoder,
}

impl FittedPreprocessing {
    /// Fit encoders on record identifiers and scalers on extracted features.
    pub fn fit(users: &[UserRecord], items: &[ItemRecord]) -> Result<Self> {
        if users.is_empty() || items.is_empty() {
            return Err(CoreError::InvalidParameters(format!(
                "need at least one user and one item, got {} users and {} items",
                users.len(),
                items.len()
            )));
        }

        let user_rows: Vec<[f32; USER_FEATURE_DIM]> =
            users.iter().map(extract_user_features).collect();
        let item_rows: Vec<[f32; ITEM_FEATURE_DIM]> =
            items.iter().map(extract_item_features).collect();

        let fitted = Self {
            user_scaler: FeatureScaler::fit(&user_rows)?,
            item_scaler: FeatureScaler::fit(&item_rows)?,
            user_encoder: IdentityEncoder::fit(users.iter().map(|u| u.id.as_str())),
            item_encoder: IdentityEncoder::fit(items.iter().map(|i| i.id.as_str())),
        };

        info!(
            "Fitted preprocessing on {} users and {} items",
            fitted.user_encoder.len(),
            fitted.item_encoder.len()
        );
        Ok(fitted)
    }

    pub fn scale_user(&self, user: &UserRecord) -> Result<Vec<f32>> {
        self.user_scaler.transform(&extract_user_features(user))
    }

    pub fn scale_item(&self, item: &ItemRecord) -> Result<Vec<f32>> {
        self.item_scaler.transform(&extract_item_features(item))
    }

    /// Resolve a user to its embedding row and scaled features.
    pub fn encode_user(&self, user: &UserRecord) -> Result<EncodedEntity> {
        Ok(EncodedEntity {
            index: self.user_encoder.transform(&user.id)?,
            features: self.scale_user(user)?,
        })
    }

    /// Resolve an item to its embedding row and scaled features.
    pub fn encode_item(&self, item: &ItemRecord) -> Result<EncodedEntity> {
        Ok(EncodedEntity {
            index: self.item_encoder.transform(&item.id)?,
            features: self.scale_item(item)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.user_scaler.validate(USER_FEATURE_DIM)?;
        self.item_scaler.validate(ITEM_FEATURE_DIM)?;
        if self.user_encoder.is_empty() || self.item_encoder.is_empty() {
            return Err(CoreError::InvalidArtifact("empty identity vocabulary".into()));
        }
        Ok(())
    }

    /// Write the four state files into `dir`, returning file name to BLAKE3 digest.
    pub fn write_to_dir(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let mut digests = BTreeMap::new();
        digests.insert(
            USER_SCALER_FILE.to_string(),
            write_canonical_file(&dir.join(USER_SCALER_FILE), &self.user_scaler)?,
        );
        digests.insert(
            ITEM_SCALER_FILE.to_string(),
            write_canonical_file(&dir.join(ITEM_SCALER_FILE), &self.item_scaler)?,
        );
        digests.insert(
            USER_ENCODER_FILE.to_string(),
            write_canonical_file(&dir.join(USER_ENCODER_FILE), &self.user_encoder)?,
        );
        digests.insert(
            ITEM_ENCODER_FILE.to_string(),
            write_canonical_file(&dir.join(ITEM_ENCODER_FILE), &self.item_encoder)?,
        );

        debug!("Wrote preprocessing state to {}", dir.display());
        Ok(digests)
    }

    /// Load and validate the four state files from `dir`.
    pub fn read_from_dir(dir: &Path) -> Result<Self> {
        let fitted = Self {
            user_scaler: read_json_file(&dir.join(USER_SCALER_FILE))?,
            item_scaler: read_json_file(&dir.join(ITEM_SCALER_FILE))?,
            user_encoder: read_json_file(&dir.join(USER_ENCODER_FILE))?,
            item_encoder: read_json_file(&dir.join(ITEM_ENCODER_FILE))?,
        };
        fitted.validate()?;
        Ok(fitted)
    }
}
