//! Per-track sample table (`stbl`) builders: audio, text (`tx3g`), and image (`jpeg`).

pub mod audio;
pub mod image;
pub mod text;

/// Run-length encode a per-chunk sample-count plan into `(first_chunk, samples_per_chunk)`
/// pairs, 1-based chunk indices, exactly as every `stsc` builder in this crate does.
/// Used for both the audio chunk plan and, generalized from the image-track builder,
/// for text tracks too (superseding the reference implementation's hardcoded
/// three-entry `stsc` for titles, which only happened to work for exactly three samples).
pub fn run_length_stsc(chunk_plan: &[u32]) -> Vec<(u32, u32)> {
    let mut entries = Vec::new();
    let mut i = 0usize;
    let mut chunk_index = 1u32;
    while i < chunk_plan.len() {
        let samples = chunk_plan[i];
        let run_start = i;
        while i < chunk_plan.len() && chunk_plan[i] == samples {
            i += 1;
        }
        entries.push((chunk_index, samples));
        chunk_index += (i - run_start) as u32;
    }
    entries
}

/// Derive a chunk plan (samples-per-chunk, one entry per chunk) from an `stsc`
/// payload, run-length expanded against `total_samples`.
///
/// Note this does not clamp the final chunk's sample count down to the exact
/// remainder: it keeps pushing `samples_per_chunk`-sized chunks until the
/// running total reaches or exceeds `total_samples`, matching the reference
/// parser's behavior (a `{first_chunk:1, samples_per_chunk:3}` entry over 10
/// samples derives `[3,3,3,3]`, not `[3,3,3,1]`).
pub fn chunk_plan_from_stsc(stsc_payload: &[u8], total_samples: u32) -> Vec<u32> {
    if stsc_payload.len() < 16 {
        return Vec::new();
    }
    let entry_count =
        u32::from_be_bytes([stsc_payload[4], stsc_payload[5], stsc_payload[6], stsc_payload[7]])
            as usize;
    let mut entries = Vec::with_capacity(entry_count);
    let mut off = 8usize;
    for _ in 0..entry_count {
        if off + 12 > stsc_payload.len() {
            break;
        }
        let first_chunk = u32::from_be_bytes(stsc_payload[off..off + 4].try_into().unwrap());
        let samples_per_chunk =
            u32::from_be_bytes(stsc_payload[off + 4..off + 8].try_into().unwrap());
        entries.push((first_chunk, samples_per_chunk));
        off += 12;
    }

    let mut plan = Vec::new();
    let mut consumed = 0u32;
    for (idx, &(first_chunk, samples_per_chunk)) in entries.iter().enumerate() {
        if samples_per_chunk == 0 {
            break;
        }
        let next_first = entries.get(idx + 1).map(|e| e.0).unwrap_or(0);
        let chunk_count = if next_first > first_chunk { next_first - first_chunk } else { 0 };
        if chunk_count == 0 {
            while consumed < total_samples {
                plan.push(samples_per_chunk);
                consumed += samples_per_chunk;
            }
        } else {
            for _ in 0..chunk_count {
                if consumed >= total_samples {
                    break;
                }
                plan.push(samples_per_chunk);
                consumed += samples_per_chunk;
            }
        }
    }
    plan
}

/// Synthesize a chunk plan of `chunk_size`-sample groups plus a single remainder,
/// the audio default (21 samples/chunk) per the orchestrator.
pub fn synthesize_chunk_plan(total_samples: u32, chunk_size: u32) -> Vec<u32> {
    if total_samples == 0 {
        return Vec::new();
    }
    let mut plan = Vec::new();
    let mut remaining = total_samples;
    while remaining > 0 {
        let take = remaining.min(chunk_size);
        plan.push(take);
        remaining -= take;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_length_collapses_uniform_plan() {
        assert_eq!(run_length_stsc(&[1, 1, 1, 1]), vec![(1, 1)]);
    }

    #[test]
    fn run_length_splits_on_change() {
        assert_eq!(run_length_stsc(&[21, 21, 5]), vec![(1, 21), (3, 5)]);
    }

    #[test]
    fn chunk_plan_from_stsc_clamps_to_total_samples() {
        let mut stsc = Vec::new();
        stsc.extend_from_slice(&[0, 0, 0, 0]); // version/flags
        stsc.extend_from_slice(&1u32.to_be_bytes()); // entry_count
        stsc.extend_from_slice(&1u32.to_be_bytes()); // first_chunk
        stsc.extend_from_slice(&3u32.to_be_bytes()); // samples_per_chunk
        stsc.extend_from_slice(&1u32.to_be_bytes()); // sample_description_index
        assert_eq!(chunk_plan_from_stsc(&stsc, 10), vec![3, 3, 3, 3]);
    }

    #[test]
    fn synthesize_chunk_plan_21_and_22_samples() {
        assert_eq!(synthesize_chunk_plan(21, 21), vec![21]);
        assert_eq!(synthesize_chunk_plan(22, 21), vec![21, 1]);
    }
}
