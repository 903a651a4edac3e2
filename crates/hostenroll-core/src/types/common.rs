use serde::{Deserialize, Serialize};

/// Key usage requested for an issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    /// TLS client authentication
    #[serde(rename = "client auth")]
    ClientAuth,
    /// TLS server authentication
    #[serde(rename = "server auth")]
    ServerAuth,
    /// Digital signature
    #[serde(rename = "digital signature")]
    DigitalSignature,
    /// Key encipherment
    #[serde(rename = "key encipherment")]
    KeyEncipherment,
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientAuth => write!(f, "client auth"),
            Self::ServerAuth => write!(f, "server auth"),
            Self::DigitalSignature => write!(f, "digital signature"),
            Self::KeyEncipherment => write!(f, "key encipherment"),
        }
    }
}

/// Name and server-assigned uid of a submitted enrollment request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRef {
    /// Deterministic request name
    pub name: String,
    /// Opaque id assigned by the CA service
    pub uid: String,
}

impl std::fmt::Display for RequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.uid)
    }
}

/// Serde adapter for byte fields carried as standard base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for `Option<Vec<u8>>`; `None` and empty strings are equivalent.
    pub mod option {
        use super::STANDARD;
        use base64::Engine;
        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded = Option::<String>::deserialize(deserializer)?;
            match encoded.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => STANDARD.decode(s).map(Some).map_err(serde::de::Error::custom),
            }
        }
    }
}
