use std::time::{Duration, SystemTime};

use rand::RngCore;
use ssh_key::certificate::{Builder as CertBuilder, CertType};
use ssh_key::{Algorithm, PrivateKey, PublicKey};

/// Mints a short-lived SSH user certificate for `public_key`, signed by the
/// gateway's CA key, scoped to the single principal string this session is
/// allowed to present.
///
/// `ttl` is clamped the way a token-bucket bucket's burst is: the caller
/// picks it from config, this function only enforces the `valid_after`
/// skew and `permit-pty` extension that every minted cert must carry.
pub fn mint_user_certificate(
    ca_key: &PrivateKey,
    user_public_key: &PublicKey,
    principal: &str,
    key_id: &str,
    ttl: Duration,
) -> anyhow::Result<ssh_key::Certificate> {
    let now = SystemTime::now();
    let valid_after = now
        .checked_sub(Duration::from_secs(30))
        .unwrap_or(now)
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs();
    let valid_before = now
        .checked_add(ttl)
        .unwrap_or(now)
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs();

    let mut serial_bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut serial_bytes);
    let serial = u64::from_le_bytes(serial_bytes);

    let mut builder = CertBuilder::new_with_random_nonce(
        &mut rand::rngs::OsRng,
        user_public_key,
        valid_after,
        valid_before,
    )?;
    builder.serial(serial)?;
    builder.key_id(key_id)?;
    builder.cert_type(CertType::User)?;
    builder.valid_principal(principal)?;
    builder.extension("permit-pty", "")?;

    let cert = builder.sign(ca_key)?;
    Ok(cert)
}

/// Formats a gateway host key entry the way `ssh-keyscan` output looks,
/// used as the `known_hosts` field returned alongside a minted cert.
pub fn known_hosts_line(host: &str, port: u16, host_public_key: &PublicKey) -> anyhow::Result<String> {
    let host_part = if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    };
    Ok(format!("{host_part} {}", host_public_key.to_openssh()?))
}

/// `prefix:namespace:name` principal, parsed back out on the SSH server
/// side to resolve which pod to attach to.
pub fn principal_string(prefix: &str, namespace: &str, name: &str) -> String {
    format!("{prefix}:{namespace}:{name}")
}

pub fn parse_principal(principal: &str, expected_prefix: &str) -> Option<(String, String)> {
    let mut parts = principal.splitn(3, ':');
    let prefix = parts.next()?;
    if prefix != expected_prefix {
        return None;
    }
    let namespace = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    Some((namespace, name))
}

pub fn algorithm_is_supported(algorithm: &Algorithm) -> bool {
    matches!(algorithm, Algorithm::Ed25519)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_round_trips() {
        let principal = principal_string("ws", "team-a", "my-workspace");
        assert_eq!(principal, "ws:team-a:my-workspace");
        let parsed = parse_principal(&principal, "ws").unwrap();
        assert_eq!(parsed, ("team-a".to_string(), "my-workspace".to_string()));
    }

    #[test]
    fn parse_principal_rejects_wrong_prefix() {
        assert!(parse_principal("other:team-a:my-workspace", "ws").is_none());
    }
}
