//! Agent profile editing and image upload.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use courier_portal_core::IdentityId;

use crate::db::{RepositoryError, Store};
use crate::models::{Agent, ProfileUpdate};
use crate::storage::{ObjectStorage, StorageError};

/// Largest accepted profile image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Folder for profile images inside the storage bucket.
const IMAGE_FOLDER: &str = "profile-images";

const NAME_MAX: usize = 100;
const PHONE_MIN: usize = 7;
const PHONE_MAX: usize = 20;
const AGE_MIN: i32 = 18;
const AGE_MAX: i32 = 100;
const ADDRESS_MAX: usize = 500;
const VEHICLE_MAX: usize = 20;

/// Errors from profile actions.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

fn invalid(message: impl Into<String>) -> ProfileError {
    ProfileError::Validation(message.into())
}

/// Age as sent by the form: a number or numeric text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AgeInput {
    Number(i64),
    Text(String),
}

/// Raw profile edit as posted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub age: Option<AgeInput>,
    pub address: Option<String>,
    pub vehicle_number: Option<String>,
}

impl ProfileInput {
    /// Validate the input into an update.
    ///
    /// Absent fields are left alone; empty strings clear optional fields.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Validation` naming the first bad field, or when
    /// nothing would change.
    pub fn validate(&self) -> Result<ProfileUpdate, ProfileError> {
        let name = match self.name.as_deref().map(str::trim) {
            None => None,
            Some("") => return Err(invalid("Name cannot be empty")),
            Some(name) if name.chars().count() > NAME_MAX => {
                return Err(invalid("Name must be at most 100 characters"));
            }
            Some(name) => Some(name.to_owned()),
        };

        let phone = self
            .phone
            .as_deref()
            .map(|raw| clearable(raw, validate_phone))
            .transpose()?;

        let age = self.age.as_ref().map(validate_age).transpose()?;

        let address = self
            .address
            .as_deref()
            .map(|raw| {
                clearable(raw, |s| {
                    if s.chars().count() > ADDRESS_MAX {
                        Err(invalid("Address must be at most 500 characters"))
                    } else {
                        Ok(s.to_owned())
                    }
                })
            })
            .transpose()?;

        let vehicle_number = self
            .vehicle_number
            .as_deref()
            .map(|raw| {
                clearable(raw, |s| {
                    if s.chars().count() > VEHICLE_MAX {
                        Err(invalid("Vehicle number must be at most 20 characters"))
                    } else {
                        Ok(s.to_owned())
                    }
                })
            })
            .transpose()?;

        let update = ProfileUpdate {
            name,
            phone,
            age,
            address,
            vehicle_number,
        };

        if update.is_empty() {
            return Err(invalid("No profile fields to update"));
        }

        Ok(update)
    }
}

/// Empty (after trimming) clears the field; anything else goes through `check`.
fn clearable(
    raw: &str,
    check: impl FnOnce(&str) -> Result<String, ProfileError>,
) -> Result<Option<String>, ProfileError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        check(trimmed).map(Some)
    }
}

fn validate_phone(phone: &str) -> Result<String, ProfileError> {
    let len = phone.chars().count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));

    if !allowed || !(PHONE_MIN..=PHONE_MAX).contains(&len) {
        return Err(invalid(
            "Phone must be 7-20 characters of digits, spaces, +, - or parentheses",
        ));
    }
    Ok(phone.to_owned())
}

fn validate_age(age: &AgeInput) -> Result<Option<i32>, ProfileError> {
    let value = match age {
        AgeInput::Number(n) => *n,
        AgeInput::Text(text) => match text.trim() {
            "" => return Ok(None),
            text => text
                .parse::<i64>()
                .map_err(|_| invalid("Age must be a whole number"))?,
        },
    };

    i32::try_from(value)
        .ok()
        .filter(|age| (AGE_MIN..=AGE_MAX).contains(age))
        .map(Some)
        .ok_or_else(|| invalid("Age must be between 18 and 100"))
}

/// File extension for an accepted image content type.
#[must_use]
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Profile service.
pub struct ProfileService<'a> {
    store: &'a dyn Store,
    storage: &'a dyn ObjectStorage,
}

impl<'a> ProfileService<'a> {
    /// Create a new profile service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, storage: &'a dyn ObjectStorage) -> Self {
        Self { store, storage }
    }

    /// Validate and apply a profile edit.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Validation` for bad input.
    pub async fn update(&self, agent: &Agent, input: &ProfileInput) -> Result<Agent, ProfileError> {
        let update = input.validate()?;
        let agent = self.store.update_agent_profile(agent.id, &update).await?;
        tracing::info!(agent_id = %agent.id, "Profile updated");
        Ok(agent)
    }

    /// Store a new profile image and save its public URL on the agent.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Validation` for empty, oversized or
    /// unsupported files and `ProfileError::Storage` if the upload fails.
    pub async fn upload_image(
        &self,
        agent: &Agent,
        identity_id: &IdentityId,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Agent, ProfileError> {
        let ext = image_extension(content_type).ok_or_else(|| {
            invalid("Invalid file type. Only JPEG, PNG, WebP and GIF images are allowed")
        })?;

        if body.is_empty() {
            return Err(invalid("No file provided"));
        }
        if body.len() > MAX_IMAGE_BYTES {
            return Err(invalid("File too large. Maximum size is 5MB"));
        }

        let path = format!(
            "{IMAGE_FOLDER}/{identity_id}_{}.{ext}",
            Utc::now().timestamp_millis()
        );

        self.storage.put(&path, content_type, body).await?;
        let url = self.storage.public_url(&path);

        let agent = self.store.set_agent_image(agent.id, &url).await?;
        tracing::info!(agent_id = %agent.id, path = %path, "Profile image uploaded");
        Ok(agent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(json: &str) -> ProfileInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_update() {
        let update = input(
            r#"{"name": " Sam ", "phone": "+44 (0) 7700-900", "age": "34", "vehicle_number": ""}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(update.name.as_deref(), Some("Sam"));
        assert_eq!(update.phone, Some(Some("+44 (0) 7700-900".to_owned())));
        assert_eq!(update.age, Some(Some(34)));
        assert_eq!(update.vehicle_number, Some(None));
        assert_eq!(update.address, None);
    }

    #[test]
    fn test_rejects_bad_fields() {
        for body in [
            r#"{"name": "   "}"#,
            r#"{"phone": "12345"}"#,
            r#"{"phone": "0123-abc-456"}"#,
            r#"{"age": 17}"#,
            r#"{"age": 101}"#,
            r#"{"age": "old"}"#,
            r#"{"vehicle_number": "XXXXXXXXXXXXXXXXXXXXX"}"#,
        ] {
            assert!(
                matches!(input(body).validate(), Err(ProfileError::Validation(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(matches!(
            input("{}").validate(),
            Err(ProfileError::Validation(_))
        ));
    }

    #[test]
    fn test_numeric_age_and_clearing() {
        let update = input(r#"{"age": 18, "address": "  "}"#).validate().unwrap();
        assert_eq!(update.age, Some(Some(18)));
        assert_eq!(update.address, Some(None));

        let cleared = input(r#"{"age": ""}"#).validate().unwrap();
        assert_eq!(cleared.age, Some(None));
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/jpeg"), Some("jpg"));
        assert_eq!(image_extension("IMAGE/PNG"), Some("png"));
        assert_eq!(image_extension("image/webp"), Some("webp"));
        assert_eq!(image_extension("image/gif"), Some("gif"));
        assert_eq!(image_extension("image/svg+xml"), None);
        assert_eq!(image_extension("application/pdf"), None);
    }
}
