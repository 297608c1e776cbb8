/// Positive samples required before a learner counts as mature.
///
/// Kept at its historical value; tune only together with a calibration run.
pub const MATURITY_THRESHOLD: usize = 5;

pub(super) const MIN_HASH_BITS: u32 = 8;
pub(super) const MAX_HASH_BITS: u32 = 22;
pub(super) const MAX_NGRAM: usize = 3;

pub(super) fn clamp_hash_bits(value: u32) -> u32 {
    value.clamp(MIN_HASH_BITS, MAX_HASH_BITS)
}

pub(super) fn clamp_ngram_max(value: usize) -> usize {
    value.clamp(1, MAX_NGRAM)
}

pub(super) fn default_bucket_namespace() -> String {
    "tagwise".to_string()
}

pub(super) fn default_maturity_threshold() -> usize {
    MATURITY_THRESHOLD
}

pub(super) fn default_flag_vocabulary() -> Vec<String> {
    [
        "heading",
        "list_item",
        "table_cell",
        "definition",
        "party_reference",
        "amount",
        "date",
    ]
    .iter()
    .map(|flag| (*flag).to_string())
    .collect()
}

pub(super) fn default_hash_bits() -> u32 {
    16
}

pub(super) fn default_ngram_max() -> usize {
    2
}

pub(super) fn default_max_features() -> usize {
    50_000
}

pub(super) fn default_min_df() -> usize {
    1
}

pub(super) fn default_pa_c() -> f32 {
    1.0
}

pub(super) fn default_logreg_epochs() -> usize {
    30
}

pub(super) fn default_logreg_learning_rate() -> f32 {
    0.5
}

pub(super) fn default_logreg_l2() -> f32 {
    1e-4
}

pub(super) fn default_logreg_batch_size() -> usize {
    32
}

pub(super) fn default_seed() -> u64 {
    42
}
