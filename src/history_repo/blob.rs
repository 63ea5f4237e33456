// BLOB version prefix helpers. [version: u8][payload].
// Version 1 = wincode-encoded Vec of the sample's named series.

pub(super) const BLOB_VERSION: u8 = 1;

pub(super) fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

/// Payload after the version byte; an unknown version is an error, not a guess.
pub(super) fn blob_payload(bytes: &[u8], expected_version: u8) -> anyhow::Result<&[u8]> {
    match bytes.split_first() {
        Some((&version, payload)) if version == expected_version => Ok(payload),
        Some((&version, _)) => Err(anyhow::anyhow!(
            "unsupported blob version {} (expected {})",
            version,
            expected_version
        )),
        None => Err(anyhow::anyhow!("empty blob")),
    }
}
