/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Signed messages and aggregates of signed messages.

use super::{
    crypto_primitives::{Signature, Verifier, VerifyingKey},
    data_types::SignatureBytes,
    validator_set::ValidatorSet,
};

/// Data types that contain: 1. A message, and 2. A digital signature over the canonical (Borsh) encoding
/// of said message whose correctness can be verified against a `VerifyingKey`.
pub(crate) trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        verifying_key
            .verify(&self.message_bytes(), &signature)
            .is_ok()
    }
}

/// Data types that aggregate signatures from multiple validators into evidence that a quorum of a
/// particular validator set supports a particular decision.
pub trait Certificate {
    /// Check whether the certificate carries correct signatures from distinct members of
    /// `validator_set` whose powers add up to at least [`ValidatorSet::quorum`].
    fn is_correctly_signed(&self, validator_set: &ValidatorSet) -> bool;
}
