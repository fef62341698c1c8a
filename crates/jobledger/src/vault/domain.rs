use super::VaultError;

/// Reduces a URL or host name to the key credentials are stored under.
///
/// Lower-cases, strips scheme, userinfo, port, path, query, fragment, a
/// trailing dot and a leading `www.`. Subdomains are kept: applicant
/// portals such as `acme.myworkdayjobs.com` are separate accounts.
pub fn normalize_domain(input: &str) -> Result<String, VaultError> {
    let lowered = input.trim().to_ascii_lowercase();
    let rest = match lowered.split_once("://") {
        Some((_, rest)) => rest,
        None => lowered.as_str(),
    };

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);

    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else {
        host_port.split(':').next().unwrap_or_default()
    };

    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '\\') {
        return Err(VaultError::Validation(format!(
            "cannot derive a domain from '{}'",
            input.trim()
        )));
    }
    Ok(host.to_string())
}
