use argon2::{
    Argon2,
    password_hash::{Error, PasswordHash, PasswordVerifier},
};
use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha512};

// Werkzeug's default when the iteration count is left out of the method.
const WERKZEUG_PBKDF2_ITERATIONS: u32 = 600_000;
const WERKZEUG_SCRYPT_LEN: usize = 64;

/// Checks `password` against a stored hash.
///
/// Accepts the Werkzeug `method$salt$hexdigest` strings written by the
/// school's admin screens (`pbkdf2:<digest>[:<iterations>]` and
/// `scrypt:<n>:<r>:<p>`) and argon2 PHC strings.
pub fn verify_password(password: &str, hashed: &str) -> Result<(), Error> {
    if hashed.starts_with("pbkdf2:") || hashed.starts_with("scrypt:") {
        return verify_werkzeug(password, hashed);
    }

    let argon2 = Argon2::default();
    let parsed = PasswordHash::new(hashed)?;

    argon2.verify_password(password.as_bytes(), &parsed)
}

fn verify_werkzeug(password: &str, hashed: &str) -> Result<(), Error> {
    let mut parts = hashed.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::PhcStringField);
    };

    let salt = salt.as_bytes();
    let password = password.as_bytes();
    let mut args = method.split(':');

    let derived = match args.next() {
        Some("pbkdf2") => {
            let digest = args.next().ok_or(Error::PhcStringField)?;
            let iterations = match args.next() {
                Some(raw) => raw.parse().map_err(|_| Error::PhcStringField)?,
                None => WERKZEUG_PBKDF2_ITERATIONS,
            };
            match digest {
                "sha256" => {
                    let mut out = [0u8; 32];
                    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
                    out.to_vec()
                }
                "sha512" => {
                    let mut out = [0u8; 64];
                    pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
                    out.to_vec()
                }
                _ => return Err(Error::Algorithm),
            }
        }
        Some("scrypt") => {
            let mut numbers = args.map(|raw| raw.parse::<u32>().map_err(|_| Error::PhcStringField));
            let n = numbers.next().transpose()?.unwrap_or(1 << 15);
            let r = numbers.next().transpose()?.unwrap_or(8);
            let p = numbers.next().transpose()?.unwrap_or(1);
            if !n.is_power_of_two() {
                return Err(Error::PhcStringField);
            }

            let params = scrypt::Params::new(n.trailing_zeros() as u8, r, p, WERKZEUG_SCRYPT_LEN)
                .map_err(|_| Error::ParamsMaxExceeded)?;
            let mut out = [0u8; WERKZEUG_SCRYPT_LEN];
            scrypt::scrypt(password, salt, &params, &mut out).map_err(|_| Error::Crypto)?;
            out.to_vec()
        }
        _ => return Err(Error::Algorithm),
    };

    if hex_eq(&derived, expected) {
        Ok(())
    } else {
        Err(Error::Password)
    }
}

/// Compares `bytes` with a lowercase hex string without stopping early.
fn hex_eq(bytes: &[u8], hex: &str) -> bool {
    let encoded: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    encoded.len() == hex.len()
        && encoded
            .bytes()
            .zip(hex.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
