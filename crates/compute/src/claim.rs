//! The claim module holds the [Claim] submitted by a claimer together with its proofs.

use crate::{
    error::MerkleError,
    merkle::{SparseTree, LOG2_LITERAL_SIZE},
    Drive,
};
use ethers::types::H256;
use serde::{Deserialize, Serialize};

/// A [Claim] asserts the final hash and output of a computation, and carries the proofs the
/// state machine verifies before accepting it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// The hash of the machine after running for `final_time` steps.
    pub final_hash: H256,
    /// The drives the claimer ran the machine with; must match the stored drives.
    pub drives: Vec<Drive>,
    /// For each drive, the sibling path proving its slot is pristine in the machine with every
    /// previous drive folded in.
    pub drive_siblings: Vec<Vec<H256>>,
    /// The 32-byte output read from the final machine.
    pub output: H256,
    /// The sibling path of the output in the final machine.
    pub output_siblings: Vec<H256>,
}

impl Claim {
    /// Builds a [Claim] from a view of the template machine and of the final machine.
    ///
    /// ### Takes
    /// - `template`: The machine before any drive is mounted.
    /// - `drives`: The drives of the instance, in order.
    /// - `drive_hashes`: The resolved hash of every drive.
    /// - `final_machine`: The machine after the run, without the output mounted.
    /// - `output_position`: The address the output is mounted at.
    /// - `output`: The output value.
    ///
    /// ### Returns
    /// - `Ok(Claim)`: A claim whose proofs verify against the template hash.
    /// - `Err(MerkleError)`: A drive or the output does not fit its machine.
    pub fn build(
        template: &SparseTree,
        drives: &[Drive],
        drive_hashes: &[H256],
        final_machine: &SparseTree,
        output_position: u64,
        output: H256,
    ) -> Result<Self, MerkleError> {
        let mut machine = template.clone();
        let mut drive_siblings = Vec::with_capacity(drives.len());
        for (drive, hash) in drives.iter().zip(drive_hashes) {
            drive_siblings.push(machine.siblings(drive.position, drive.log2_size)?);
            machine.mount(drive.position, drive.log2_size, *hash)?;
        }

        let mut final_machine = final_machine.clone();
        final_machine.mount_literal(output_position, &output)?;

        Ok(Self {
            final_hash: final_machine.root()?,
            drives: drives.to_vec(),
            drive_siblings,
            output,
            output_siblings: final_machine.siblings(output_position, LOG2_LITERAL_SIZE)?,
        })
    }
}
