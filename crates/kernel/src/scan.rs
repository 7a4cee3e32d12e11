//! Exclusive prefix sums over per-cell occupancy counts.
//!
//! The parallel path is a work-efficient Blelloch scan: the input is padded to
//! a power of two, an up-sweep builds partial sums in a balanced tree, and a
//! down-sweep distributes them back as exclusive prefixes. Every tree level
//! touches disjoint chunks, so each level is a single data-parallel pass.
//!
//! ```text
//! out[0] = 0
//! out[i] = out[i-1] + in[i-1]      for 0 < i < n
//! ```

use rayon::prelude::*;

/// Inputs shorter than this are scanned sequentially.
pub const SEQUENTIAL_THRESHOLD: usize = 4096;

/// Minimum number of chunks a rayon task handles during one tree level.
const MIN_CHUNKS_PER_TASK: usize = 512;

/// Exclusive scan of `input`, returning the prefix array and the grand total.
pub fn exclusive_scan(input: &[u32]) -> (Vec<u32>, u32) {
    let mut out = Vec::with_capacity(input.len());
    let total = exclusive_scan_into(input, &mut out);
    (out, total)
}

/// Exclusive scan of `input` into `out` (resized to `input.len()`).
///
/// Picks the sequential path for small inputs and the Blelloch path otherwise.
/// Returns the grand total `Σ input`.
pub fn exclusive_scan_into(input: &[u32], out: &mut Vec<u32>) -> u32 {
    if input.len() < SEQUENTIAL_THRESHOLD {
        sequential_scan_into(input, out)
    } else {
        blelloch_scan_into(input, out)
    }
}

/// Straightforward single-threaded exclusive scan. Used below the threshold and
/// as the reference in tests.
pub fn sequential_exclusive_scan(input: &[u32]) -> (Vec<u32>, u32) {
    let mut out = Vec::with_capacity(input.len());
    let total = sequential_scan_into(input, &mut out);
    (out, total)
}

fn sequential_scan_into(input: &[u32], out: &mut Vec<u32>) -> u32 {
    out.clear();
    let mut running = 0u32;
    for &v in input {
        out.push(running);
        running += v;
    }
    running
}

/// Blelloch up-sweep/down-sweep scan, regardless of input size.
///
/// Exposed so tests can drive the parallel path with small, odd lengths.
pub fn blelloch_scan_into(input: &[u32], out: &mut Vec<u32>) -> u32 {
    let n = input.len();
    out.clear();
    if n == 0 {
        return 0;
    }

    let padded = n.next_power_of_two();
    let mut tree = vec![0u32; padded];
    tree[..n].copy_from_slice(input);

    // --- Up-sweep (reduce) ---
    let mut stride = 1;
    while stride < padded {
        let span = stride * 2;
        tree.par_chunks_mut(span)
            .with_min_len(MIN_CHUNKS_PER_TASK)
            .for_each(|c| c[span - 1] += c[stride - 1]);
        stride = span;
    }

    let total = tree[padded - 1];
    tree[padded - 1] = 0;

    // --- Down-sweep ---
    let mut stride = padded / 2;
    while stride >= 1 {
        let span = stride * 2;
        tree.par_chunks_mut(span)
            .with_min_len(MIN_CHUNKS_PER_TASK)
            .for_each(|c| {
                let left = c[stride - 1];
                c[stride - 1] = c[span - 1];
                c[span - 1] += left;
            });
        stride /= 2;
    }

    out.extend_from_slice(&tree[..n]);
    total
}
