use chrono::Utc;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::api::{BankBrief, DepositoryClient};
use crate::core::{ProfileError, StoreError};
use crate::monitoring::records::{NewProfileRecord, Profile};
use crate::monitoring::RecordStore;
use crate::vault::{self, ProfileKey};

pub const DEFAULT_QUANTITY: i64 = 10;

/// Input for a new profile. Secrets arrive in plaintext and are sealed
/// before anything touches the store.
#[derive(Clone, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub dpid: String,
    pub boid: String,
    pub password: String,
    pub transaction_pin: String,
    pub crn: String,
    pub default_bank_id: i64,
    #[serde(default)]
    pub default_quantity: Option<i64>,
    #[serde(default)]
    pub ask_for_quantity: bool,
}

impl fmt::Debug for NewProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewProfile")
            .field("name", &self.name)
            .field("dpid", &self.dpid)
            .field("boid", &self.boid)
            .field("default_bank_id", &self.default_bank_id)
            .finish_non_exhaustive()
    }
}

/// Partial edit. `None` leaves the field as it is.
#[derive(Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub default_bank_id: Option<i64>,
    pub default_quantity: Option<i64>,
    pub ask_for_quantity: Option<bool>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
    pub transaction_pin: Option<String>,
    pub crn: Option<String>,
}

/// Decrypted view of a profile, handed to a session once at start.
#[derive(Clone)]
pub struct Credentials {
    pub profile_id: i64,
    pub name: String,
    pub dpid: String,
    pub boid: String,
    pub password: String,
    pub transaction_pin: String,
    pub crn: String,
    pub default_bank_id: i64,
    pub default_quantity: i64,
    pub ask_for_quantity: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("profile_id", &self.profile_id)
            .field("name", &self.name)
            .field("dpid", &self.dpid)
            .field("boid", &self.boid)
            .finish_non_exhaustive()
    }
}

fn require(field: &str, value: &str) -> Result<(), ProfileError> {
    if value.trim().is_empty() {
        return Err(ProfileError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_positive(field: &str, value: i64) -> Result<(), ProfileError> {
    if value <= 0 {
        return Err(ProfileError::Validation(format!(
            "{} must be positive, got {}",
            field, value
        )));
    }
    Ok(())
}

impl NewProfile {
    fn validate(&self) -> Result<(), ProfileError> {
        require("name", &self.name)?;
        require("dpid", &self.dpid)?;
        require("boid", &self.boid)?;
        require("password", &self.password)?;
        require("transaction_pin", &self.transaction_pin)?;
        require("crn", &self.crn)?;
        require_positive("default_bank_id", self.default_bank_id)?;
        require_positive("default_quantity", self.quantity())
    }

    fn quantity(&self) -> i64 {
        self.default_quantity.unwrap_or(DEFAULT_QUANTITY)
    }
}

#[derive(Clone)]
pub struct ProfileManager {
    store: Arc<dyn RecordStore>,
}

impl ProfileManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, profile: NewProfile) -> Result<Profile, ProfileError> {
        profile.validate()?;

        let key = vault::generate_key();
        let record = NewProfileRecord {
            name: profile.name.trim().to_string(),
            dpid: profile.dpid.trim().to_string(),
            boid: profile.boid.trim().to_string(),
            default_bank_id: profile.default_bank_id,
            default_quantity: profile.quantity(),
            ask_for_quantity: profile.ask_for_quantity,
            password_enc: vault::encrypt(&key, &profile.password)?,
            pin_enc: vault::encrypt(&key, &profile.transaction_pin)?,
            crn_enc: vault::encrypt(&key, &profile.crn)?,
            key_material: key.to_base64(),
        };

        let created = self.store.insert_profile(record).await?;
        tracing::info!(
            "👤 Created profile {} ({}) with key {}",
            created.name,
            created.id,
            key.fingerprint()
        );

        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Profile, ProfileError> {
        self.store
            .get_profile(id)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", id).into())
    }

    pub async fn list(&self) -> Result<Vec<Profile>, ProfileError> {
        Ok(self.store.list_profiles().await?)
    }

    /// Applies the edit. Changed secrets are re-sealed under the profile's
    /// existing key.
    pub async fn update(&self, id: i64, update: ProfileUpdate) -> Result<Profile, ProfileError> {
        let mut profile = self.get(id).await?;

        if let Some(name) = update.name {
            require("name", &name)?;
            profile.name = name.trim().to_string();
        }
        if let Some(bank_id) = update.default_bank_id {
            require_positive("default_bank_id", bank_id)?;
            profile.default_bank_id = bank_id;
        }
        if let Some(quantity) = update.default_quantity {
            require_positive("default_quantity", quantity)?;
            profile.default_quantity = quantity;
        }
        if let Some(ask) = update.ask_for_quantity {
            profile.ask_for_quantity = ask;
        }
        if let Some(active) = update.is_active {
            profile.is_active = active;
        }

        if update.password.is_some() || update.transaction_pin.is_some() || update.crn.is_some() {
            let key = self.key_for(id).await?;
            if let Some(password) = update.password {
                require("password", &password)?;
                profile.password_enc = vault::encrypt(&key, &password)?;
            }
            if let Some(pin) = update.transaction_pin {
                require("transaction_pin", &pin)?;
                profile.pin_enc = vault::encrypt(&key, &pin)?;
            }
            if let Some(crn) = update.crn {
                require("crn", &crn)?;
                profile.crn_enc = vault::encrypt(&key, &crn)?;
            }
        }

        self.store.update_profile(&profile).await?;
        tracing::info!("✏️  Updated profile {} ({})", profile.name, profile.id);

        Ok(profile)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ProfileError> {
        self.store.delete_profile(id).await?;
        tracing::info!("🗑️  Deleted profile {}", id);
        Ok(())
    }

    /// Decrypts every secret of the profile.
    pub async fn credentials(&self, id: i64) -> Result<Credentials, ProfileError> {
        let profile = self.get(id).await?;
        let key = self.key_for(id).await?;

        Ok(Credentials {
            profile_id: profile.id,
            password: vault::decrypt(&key, &profile.password_enc)?,
            transaction_pin: vault::decrypt(&key, &profile.pin_enc)?,
            crn: vault::decrypt(&key, &profile.crn_enc)?,
            name: profile.name,
            dpid: profile.dpid,
            boid: profile.boid,
            default_bank_id: profile.default_bank_id,
            default_quantity: profile.default_quantity,
            ask_for_quantity: profile.ask_for_quantity,
        })
    }

    /// Logs in with the given details and returns the banks the account can
    /// apply through. Nothing is stored.
    pub async fn verify(
        &self,
        depository: &DepositoryClient,
        profile: &NewProfile,
    ) -> Result<Vec<BankBrief>, ProfileError> {
        profile.validate()?;

        let token = depository
            .login(&profile.dpid, &profile.boid, &profile.password)
            .await?;
        let banks = depository.banks(&token).await?;

        if !banks.iter().any(|b| b.id == profile.default_bank_id) {
            tracing::warn!(
                "Bank {} is not linked to {}; available: {:?}",
                profile.default_bank_id,
                profile.boid,
                banks.iter().map(|b| b.id).collect::<Vec<_>>()
            );
        }

        tracing::info!(
            "✅ Verified {} at {}",
            profile.boid,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(banks)
    }

    async fn key_for(&self, id: i64) -> Result<ProfileKey, ProfileError> {
        let material = self
            .store
            .profile_key(id)
            .await?
            .ok_or_else(|| StoreError::not_found("profile key", id))?;

        Ok(ProfileKey::from_base64(&material)?)
    }
}
