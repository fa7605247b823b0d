//! Rayon-parallel kernel (feature-gated).
//!
//! Decode units run as one rayon task per row. Suppression pairs `(i, j)` are
//! fanned out by leading slot `i`. The two phases are separated by the
//! implicit join of the first parallel iterator, standing in for
//! back-to-back launches.

use crate::kernel::{decode_unit, occupied, suppress_pair, DecodeKernel, KernelArgs};
use crate::util::DecodeResult;
use rayon::prelude::*;

/// Spreads execution units over the rayon thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonKernel;

impl DecodeKernel for RayonKernel {
    fn decode_and_suppress(&self, args: &KernelArgs) -> DecodeResult<()> {
        args.validate()?;
        let input = args.input.as_words();
        let output = args.output.as_words();

        (0..args.num_rows)
            .into_par_iter()
            .for_each(|row| decode_unit(args, input, output, row));

        let count = occupied(args, output);
        (0..count)
            .into_par_iter()
            .flat_map_iter(|i| (i + 1..count).map(move |j| (i, j)))
            .for_each(|(i, j)| suppress_pair(args, output, i, j));
        Ok(())
    }
}
