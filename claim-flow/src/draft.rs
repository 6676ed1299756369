use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::{ClaimError, Result};

/// An image held in memory, identified by a per-upload id.
///
/// Two blobs with identical bytes still have different ids: identity is the upload, not the content.
#[derive(Clone)]
pub struct ImageBlob {
    id: Uuid,
    file_name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl ImageBlob {
    /// Accept an uploaded file, sniffing its format from the bytes.
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let file_name = file_name.into();
        let bytes = bytes.into();
        let format = image::guess_format(&bytes).map_err(|e| {
            ClaimError::Validation(format!("{file_name} is not a supported image: {e}"))
        })?;
        Ok(Self::with_mime(file_name, format.to_mime_type(), bytes))
    }

    pub fn with_mime(
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Decode `data:<mime>;base64,<payload>`, or a bare base64 payload taken as PNG.
    pub fn from_data_url(file_name: impl Into<String>, url: &str) -> std::result::Result<Self, String> {
        let url = url.trim();
        let (mime, payload) = match url.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| "data URL has no payload".to_string())?;
                let mime = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| "data URL is not base64 encoded".to_string())?;
                (if mime.is_empty() { "image/png" } else { mime }, payload)
            }
            None => ("image/png", url),
        };
        if payload.is_empty() {
            return Err("image payload is empty".to_string());
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| format!("invalid base64 image: {e}"))?;
        Ok(Self::with_mime(file_name, mime, bytes))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for ImageBlob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Serialized as a reference; the bytes stay in memory.
impl Serialize for ImageBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ImageBlob", 4)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("file_name", &self.file_name)?;
        s.serialize_field("mime", &self.mime)?;
        s.serialize_field("size", &self.bytes.len())?;
        s.end()
    }
}

/// The five text fields of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimField {
    Description,
    Location,
    AccidentType,
    ImpactSpeed,
    BrakingInfo,
}

impl ClaimField {
    pub const ALL: [ClaimField; 5] = [
        ClaimField::Description,
        ClaimField::Location,
        ClaimField::AccidentType,
        ClaimField::ImpactSpeed,
        ClaimField::BrakingInfo,
    ];

    /// Form-field name used on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            ClaimField::Description => "description",
            ClaimField::Location => "location",
            ClaimField::AccidentType => "accidentType",
            ClaimField::ImpactSpeed => "impactSpeed",
            ClaimField::BrakingInfo => "brakingInfo",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFields {
    pub location: String,
    pub accident_type: String,
    /// Numeric-shaped text, kept as typed.
    pub impact_speed: String,
    pub braking_info: String,
}

impl MetadataFields {
    /// The values a fresh claim form starts with.
    pub fn sample() -> Self {
        Self {
            location: "City Mall Parking, Level 2".to_string(),
            accident_type: "Low-speed collision".to_string(),
            impact_speed: "10".to_string(),
            braking_info: "Hard braking".to_string(),
        }
    }
}

/// The claim under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimDraft {
    image: Option<ImageBlob>,
    description: String,
    fields: MetadataFields,
}

impl ClaimDraft {
    pub fn new(fields: MetadataFields) -> Self {
        Self {
            image: None,
            description: String::new(),
            fields,
        }
    }

    pub fn image(&self) -> Option<&ImageBlob> {
        self.image.as_ref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fields(&self) -> &MetadataFields {
        &self.fields
    }

    pub fn field(&self, field: ClaimField) -> &str {
        match field {
            ClaimField::Description => &self.description,
            ClaimField::Location => &self.fields.location,
            ClaimField::AccidentType => &self.fields.accident_type,
            ClaimField::ImpactSpeed => &self.fields.impact_speed,
            ClaimField::BrakingInfo => &self.fields.braking_info,
        }
    }

    pub fn set_field(&mut self, field: ClaimField, value: impl Into<String>) {
        let value = value.into();
        match field {
            ClaimField::Description => self.description = value,
            ClaimField::Location => self.fields.location = value,
            ClaimField::AccidentType => self.fields.accident_type = value,
            ClaimField::ImpactSpeed => self.fields.impact_speed = value,
            ClaimField::BrakingInfo => self.fields.braking_info = value,
        }
    }

    /// Swap the image. The description always goes with it: it described the old image.
    pub fn set_image(&mut self, image: ImageBlob) {
        self.image = Some(image);
        self.description.clear();
    }

    pub fn is_submittable(&self) -> bool {
        self.image.is_some() && !self.description.is_empty()
    }

    /// Immutable copy for submission; `None` unless submittable.
    pub fn snapshot(&self) -> Option<ClaimSnapshot> {
        if !self.is_submittable() {
            return None;
        }
        let image = self.image.clone()?;
        Some(ClaimSnapshot {
            image,
            description: self.description.clone(),
            fields: self.fields.clone(),
        })
    }
}

pub(crate) fn lock_draft(draft: &Mutex<ClaimDraft>) -> MutexGuard<'_, ClaimDraft> {
    draft.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything sent in one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimSnapshot {
    pub image: ImageBlob,
    pub description: String,
    pub fields: MetadataFields,
}

impl ClaimSnapshot {
    pub fn field(&self, field: ClaimField) -> &str {
        match field {
            ClaimField::Description => &self.description,
            ClaimField::Location => &self.fields.location,
            ClaimField::AccidentType => &self.fields.accident_type,
            ClaimField::ImpactSpeed => &self.fields.impact_speed,
            ClaimField::BrakingInfo => &self.fields.braking_info,
        }
    }

    /// Text parts of the request in wire order.
    pub fn form_parts(&self) -> Vec<(&'static str, String)> {
        ClaimField::ALL
            .iter()
            .map(|&field| (field.wire_name(), self.field(field).to_string()))
            .collect()
    }
}
