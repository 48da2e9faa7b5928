//! Secret Store entry names.

/// Names of the entries the token manager reads and writes.
pub struct StorageKeys;

impl StorageKeys {
    /// Active generated token (base64)
    pub const TOKEN: &'static str = "Token";

    /// Administrator-supplied override token (base64)
    pub const OVERRIDE_TOKEN: &'static str = "IniToken";

    /// Flag selecting the override token
    pub const USE_OVERRIDE_TOKEN: &'static str = "UseIniToken";

    /// Date of the last rotation, `YYYYMMDD`
    pub const ROTATION_DATE: &'static str = "UDate";
}
