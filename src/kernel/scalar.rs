//! Scalar reference kernel.

use crate::kernel::{decode_unit, occupied, suppress_pair, DecodeKernel, KernelArgs};
use crate::util::DecodeResult;

/// Runs every execution unit one after another on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScalarKernel;

impl DecodeKernel for ScalarKernel {
    fn decode_and_suppress(&self, args: &KernelArgs) -> DecodeResult<()> {
        args.validate()?;
        let input = args.input.as_words();
        let output = args.output.as_words();

        for row in 0..args.num_rows {
            decode_unit(args, input, output, row);
        }

        let count = occupied(args, output);
        for i in 0..count {
            for j in i + 1..count {
                suppress_pair(args, output, i, j);
            }
        }
        Ok(())
    }
}
