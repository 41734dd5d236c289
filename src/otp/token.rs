use super::error::Error;

/// Length of the password part at the end of every OTP.
pub const OTP_PASSWORD_LENGTH: usize = 32;
/// Longest accepted OTP: a 16 character key id plus the password.
pub const OTP_MAX_LENGTH: usize = 48;

/// A lowercased OTP split into key id and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Otp {
    value: String,
    split: usize,
}

impl Otp {
    /// # Errors
    /// Returns `Error::MalformedOtp` if `raw` is not between 32 and 48
    /// characters long.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let length = raw.chars().count();
        if !(OTP_PASSWORD_LENGTH..=OTP_MAX_LENGTH).contains(&length) {
            return Err(Error::MalformedOtp { length });
        }

        let value = raw.to_ascii_lowercase();
        let split = value
            .char_indices()
            .nth(length - OTP_PASSWORD_LENGTH)
            .map_or(value.len(), |(index, _)| index);

        Ok(Self { value, split })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Identity of the key that produced the OTP, possibly empty.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.value[..self.split]
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.value[self.split..]
    }
}

// only the key id, the password part stays out of logs
impl std::fmt::Debug for Otp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Otp")
            .field("device_id", &self.device_id())
            .finish_non_exhaustive()
    }
}
