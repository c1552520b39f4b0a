//! Deterministic test payloads.

/// Reproducible payload for one (rank, round) pair.
///
/// Format: `d:<rank>,<filler>,r:<round>` with `rank` underscores as
/// filler, so payload size grows with rank and size-sensitive paths in
/// the layer under test get exercised by ordinary round loops. Pure:
/// identical arguments always yield the identical string.
pub fn round_payload(rank: usize, round: u64) -> String {
    let filler = "_".repeat(rank);
    format!("d:{rank},{filler},r:{round}")
}
