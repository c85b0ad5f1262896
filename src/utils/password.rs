use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ITERATIONS: u32 = 600_000;
const KEY_LENGTH: usize = 32;

/// Hash un mot de passe avec PBKDF2-HMAC-SHA256 et un salt aléatoire de
/// 16 bytes. Format stocké : pbkdf2:sha256:iterations$salt$hash
pub fn hash_password(password: &str) -> Result<String, String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, ITERATIONS, &mut key)
        .map_err(|e| format!("PBKDF2 failure: {}", e))?;

    let salt_b64 = URL_SAFE_NO_PAD.encode(salt);
    let hash_b64 = URL_SAFE_NO_PAD.encode(key);

    Ok(format!("pbkdf2:sha256:{}${}${}", ITERATIONS, salt_b64, hash_b64))
}

/// Vérifie un mot de passe contre un hash stocké.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, String> {
    // Format : pbkdf2:sha256:iterations$salt$hash
    let parts: Vec<&str> = stored_hash.split('$').collect();
    if parts.len() != 3 {
        return Err("Invalid hash format".to_string());
    }

    let header_parts: Vec<&str> = parts[0].split(':').collect();
    if header_parts.len() != 3 || header_parts[0] != "pbkdf2" || header_parts[1] != "sha256" {
        return Err("Invalid hash header".to_string());
    }

    let iterations = header_parts[2]
        .parse::<u32>()
        .map_err(|_| "Invalid iteration count".to_string())?;

    let salt = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| format!("Salt decode failed: {}", e))?;
    let expected = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| format!("Hash decode failed: {}", e))?;

    let mut computed = vec![0u8; expected.len()];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|e| format!("PBKDF2 failure: {}", e))?;

    Ok(computed == expected)
}
