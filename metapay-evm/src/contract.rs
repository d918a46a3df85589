//! Solidity interface definitions for on-chain interactions.
//!
//! - [`IForwarder`] - Trusted forwarder that verifies and executes signed requests
//! - [`IRecipient`] - Payment recipient reached through the forwarder

use alloy_sol_types::sol;

sol! {
    /// Minimal trusted forwarder (ERC-2771 style) with deadlines.
    ///
    /// `verify` succeeds only when the signature recovers to `req.from` and
    /// `req.nonce` equals the signer's current counter. `execute` advances the
    /// counter and calls `req.to` with `req.data ++ req.from`.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    interface IForwarder {
        struct ForwardRequest {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint256 nonce;
            uint256 deadline;
            bytes data;
        }

        function getNonce(address from) external view returns (uint256);
        function verify(ForwardRequest calldata req, bytes calldata signature) external view returns (bool);
        function execute(ForwardRequest calldata req, bytes calldata signature)
            external
            payable
            returns (bool, bytes memory);
    }
}

sol! {
    /// Payment sink called through the forwarder.
    ///
    /// `pay` requires `msg.value >= amount` and emits [`IRecipient::Paid`] with
    /// the original payer recovered from the forwarded calldata.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    #[sol(rpc)]
    interface IRecipient {
        event Paid(address indexed payer, uint256 amount, string reference);

        function pay(uint256 amount, string calldata reference) external payable;
    }
}
