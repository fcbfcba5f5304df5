use rand::{distributions::Alphanumeric, Rng};
use smol_str::SmolStr;

use crate::{headers::Headers, method::Method};

/// Generates a new RFC 3261 magic-cookie branch identifier.
pub fn generate_branch_id() -> SmolStr {
    SmolStr::new(format!("z9hG4bK{}", random_token(16)))
}

/// Generates a From/To tag parameter value.
pub fn generate_tag() -> SmolStr {
    SmolStr::new(random_token(10))
}

/// Generates a Call-ID suitable for locally originated requests.
pub fn generate_call_id(host: &str) -> SmolStr {
    SmolStr::new(format!("{}@{}", random_token(20), host))
}

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Returns the top-most Via header value, if present.
pub fn top_via(headers: &Headers) -> Option<&SmolStr> {
    headers.get_all("Via").next()
}

/// Extracts the `branch=` parameter from a Via header string.
pub fn branch_from_via(via: &str) -> Option<&str> {
    via.split(';').skip(1).find_map(|part| {
        let mut split = part.splitn(2, '=');
        let name = split.next()?.trim();
        let value = split.next()?.trim();
        if name.eq_ignore_ascii_case("branch") {
            Some(value)
        } else {
            None
        }
    })
}

/// Replaces the branch parameter of the top Via header with a fresh one,
/// returning the new branch. Each re-INVITE and each OPTIONS probe is a new
/// transaction and must carry its own branch.
pub fn rotate_via_branch(headers: &mut Headers) -> Option<SmolStr> {
    let fresh = generate_branch_id();
    let via = headers
        .iter_mut()
        .find(|h| h.name.eq_ignore_ascii_case("Via"))?;

    let rebuilt: String = via
        .value
        .split(';')
        .map(|part| {
            let trimmed = part.trim();
            if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("branch=") {
                format!("branch={}", fresh)
            } else {
                trimmed.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(";");

    via.value = SmolStr::new(rebuilt);
    Some(fresh)
}

/// Parses the CSeq header into its sequence number and method.
pub fn cseq_of(headers: &Headers) -> Option<(u32, Method)> {
    let raw = headers.get("CSeq")?;
    let mut parts = raw.split_whitespace();
    let number = parts.next()?.parse().ok()?;
    let method = Method::from_token(parts.next()?);
    Some((number, method))
}

/// Extracts the tag parameter from a From/To header value.
pub fn tag_of(value: &str) -> Option<SmolStr> {
    value.split(';').skip(1).find_map(|segment| {
        let trimmed = segment.trim();
        if trimmed.len() >= 4 && trimmed[..4].eq_ignore_ascii_case("tag=") {
            Some(SmolStr::new(trimmed[4..].to_owned()))
        } else {
            None
        }
    })
}
