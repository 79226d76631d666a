/// Deterministic hashing of subjects into buckets.
pub trait Sharder {
    /// Map `input` onto `[0, total_shards)`.
    fn get_shard(&self, input: &str, total_shards: u64) -> u64;

    /// Map `input` onto `[0.0, 1.0)` with a resolution of 1/10 000.
    fn get_bucket(&self, input: &str) -> f64 {
        self.get_shard(input, BUCKET_RESOLUTION) as f64 / BUCKET_RESOLUTION as f64
    }
}

const BUCKET_RESOLUTION: u64 = 10_000;

pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let int_from_hash: u64 = (hash[0] as u64) << 24
            | (hash[1] as u64) << 16
            | (hash[2] as u64) << 8
            | (hash[3] as u64);
        int_from_hash % total_shards
    }
}

#[cfg(test)]
pub struct DeterministicSharder(pub std::collections::HashMap<String, u64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        self.0.get(input).copied().unwrap_or(0) % total_shards
    }
}
