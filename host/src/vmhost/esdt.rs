//! Builtin-function interception and ESDT transfer composition.
//!
//! Token transfers are protocol builtins, not WASM: the engine synthesizes
//! the builtin call input, hands it to the blockchain hook, and accounts
//! the gas it consumed net of any gas forwarded on produced transfers.
//! When a builtin's output indicates an embedded contract call on an
//! intra-shard destination, the engine synthesizes a new call input from
//! the transfer metadata and re-enters the destination context with it.

use num_bigint::BigUint;

use skein_vm_common::{math, Address, CallInput, CallType, EsdtTransfer, VMInput, VMOutput};

use crate::error::{HostError, HostResult};
use crate::vmhost::VMHost;

/// Builtin function moving fungible tokens.
pub const BUILTIN_ESDT_TRANSFER: &str = "ESDTTransfer";
/// Builtin function moving one NFT/SFT instance.
pub const BUILTIN_ESDT_NFT_TRANSFER: &str = "ESDTNFTTransfer";
/// Builtin function moving several token instances at once.
pub const BUILTIN_MULTI_ESDT_NFT_TRANSFER: &str = "MultiESDTNFTTransfer";

/// A decoded token-transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEsdtTransfers {
    /// The account receiving the tokens.
    pub receiver: Address,
    /// The decoded transfers.
    pub transfers: Vec<EsdtTransfer>,
    /// Embedded contract call, if the arguments carry one.
    pub call_function: Option<String>,
    /// Arguments of the embedded call.
    pub call_arguments: Vec<Vec<u8>>,
}

impl VMHost {
    /// Runs a builtin function and, if its output indicates a follow-up
    /// contract call, returns the synthesized input for it.
    pub(crate) fn handle_builtin_function_call(
        &self,
        input: &CallInput,
    ) -> HostResult<(Option<CallInput>, VMOutput)> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let builtin_output = match self.blockchain().process_builtin_function(input) {
            Ok(output) => output,
            Err(err) => {
                self.use_gas(input.vm_input.gas_provided);
                return Err(err.into());
            }
        };
        if builtin_output.return_code != skein_vm_common::ReturnCode::Ok {
            self.use_gas(input.vm_input.gas_provided);
            return Err(HostError::Hook(skein_vm_common::HookError::BuiltinFunctionFailed(
                builtin_output.return_message.clone(),
            )));
        }

        let mut builtin_output = builtin_output;
        let mut post_input = self.sc_execution_after_builtin(input, &builtin_output);

        if post_input.is_some() {
            // The embedded call consumes the produced transfers; they must
            // not also surface as plain output transfers.
            for account in builtin_output.output_accounts.values_mut() {
                account.output_transfers.clear();
            }
        }

        self.track_gas_used_by_builtin(input, &builtin_output, post_input.as_ref());

        if let Some(post) = &mut post_input {
            post.vm_input.async_arguments = input.vm_input.async_arguments.clone();
        }

        self.output_mut().add_to_active_state(&builtin_output);
        Ok((post_input, builtin_output))
    }

    /// Charges the gas a builtin consumed, net of gas it forwarded on
    /// transfers or handed to an embedded call. The callback leg is
    /// exempt: its gas was locked in advance.
    fn track_gas_used_by_builtin(
        &self,
        input: &CallInput,
        builtin_output: &VMOutput,
        post_input: Option<&CallInput>,
    ) {
        if input.vm_input.call_type == CallType::AsynchronousCallBack {
            return;
        }

        let mut gas_consumed = math::sub_u64(
            input.vm_input.gas_provided,
            builtin_output.gas_remaining,
        );
        for transfer in builtin_output.all_transfers() {
            gas_consumed = math::sub_u64(gas_consumed, transfer.gas_limit);
        }
        if let Some(post) = post_input {
            gas_consumed = math::sub_u64(gas_consumed, post.vm_input.gas_provided);
        }
        self.use_gas(gas_consumed);
    }

    /// Detects the post-builtin contract call: an intra-shard contract
    /// destination that received exactly one transfer with call data.
    fn sc_execution_after_builtin(
        &self,
        input: &CallInput,
        builtin_output: &VMOutput,
    ) -> Option<CallInput> {
        if input.vm_input.return_call_after_error
            && input.vm_input.call_type != CallType::AsynchronousCallBack
        {
            return None;
        }

        let parsed = parse_esdt_transfers(
            &input.vm_input.caller_addr,
            &input.recipient_addr,
            &input.function,
            &input.vm_input.arguments,
        )?;
        parsed.call_function.as_ref()?;

        if !self.in_same_shard(&input.vm_input.caller_addr, &parsed.receiver) {
            return None;
        }
        if !self.blockchain().is_smart_contract(&parsed.receiver) {
            return None;
        }

        let account = builtin_output.output_accounts.get(&parsed.receiver)?;
        if account.output_transfers.len() != 1 {
            return None;
        }
        let transfer = &account.output_transfers[0];

        let (function, arguments) = skein_vm_common::CallArgsParser::new()
            .parse_data(&transfer.data)
            .ok()?;

        Some(CallInput {
            vm_input: VMInput {
                caller_addr: input.vm_input.caller_addr,
                call_value: BigUint::default(),
                call_type: input.vm_input.call_type,
                arguments,
                esdt_transfers: parsed.transfers,
                gas_price: input.vm_input.gas_price,
                gas_provided: transfer.gas_limit,
                gas_locked: transfer.gas_locked,
                original_tx_hash: input.vm_input.original_tx_hash.clone(),
                current_tx_hash: input.vm_input.current_tx_hash.clone(),
                prev_tx_hash: input.vm_input.prev_tx_hash.clone(),
                ..VMInput::default()
            },
            recipient_addr: parsed.receiver,
            function,
            allow_init_function: false,
        })
    }

    /// Synthesizes the builtin call moving `transfers` from `sender` to
    /// `destination` and runs it through the blockchain hook. Returns the
    /// builtin's output and the gas it consumed.
    pub fn execute_esdt_transfer(
        &self,
        destination: &Address,
        sender: &Address,
        transfers: &[EsdtTransfer],
        call_type: CallType,
    ) -> HostResult<(VMOutput, u64)> {
        if transfers.is_empty() {
            return Err(HostError::FailedTransfer);
        }
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let gas_provided = self.gas_left();
        let mut esdt_input = CallInput {
            vm_input: VMInput {
                caller_addr: *sender,
                call_value: BigUint::default(),
                call_type,
                gas_price: self.runtime().vm_input().vm_input.gas_price,
                gas_provided,
                gas_locked: 0,
                ..VMInput::default()
            },
            recipient_addr: *destination,
            function: BUILTIN_ESDT_TRANSFER.to_string(),
            allow_init_function: false,
        };

        if transfers.len() == 1 {
            let transfer = &transfers[0];
            if transfer.nonce > 0 {
                // NFT transfers are self-addressed; the real destination
                // is an argument.
                esdt_input.function = BUILTIN_ESDT_NFT_TRANSFER.to_string();
                esdt_input.recipient_addr = *sender;
                esdt_input.vm_input.arguments = vec![
                    transfer.token_name.clone(),
                    strip_leading_zeros(&transfer.nonce.to_be_bytes()),
                    transfer.value.to_bytes_be(),
                    destination.as_bytes().to_vec(),
                ];
            } else {
                esdt_input.vm_input.arguments =
                    vec![transfer.token_name.clone(), transfer.value.to_bytes_be()];
            }
        } else {
            esdt_input.function = BUILTIN_MULTI_ESDT_NFT_TRANSFER.to_string();
            esdt_input.recipient_addr = *sender;
            let mut arguments = vec![
                destination.as_bytes().to_vec(),
                strip_leading_zeros(&(transfers.len() as u64).to_be_bytes()),
            ];
            for transfer in transfers {
                arguments.push(transfer.token_name.clone());
                arguments.push(strip_leading_zeros(&transfer.nonce.to_be_bytes()));
                arguments.push(transfer.value.to_bytes_be());
            }
            esdt_input.vm_input.arguments = arguments;
        }

        let vm_output = self.blockchain().process_builtin_function(&esdt_input)?;
        log::trace!(
            "esdt transfer: {} token(s), sender {:?}, dest {:?}",
            transfers.len(),
            sender,
            destination
        );
        if vm_output.return_code != skein_vm_common::ReturnCode::Ok {
            return Err(HostError::ExecutionFailed);
        }

        let mut gas_consumed = math::sub_u64(gas_provided, vm_output.gas_remaining);
        for transfer in vm_output.all_transfers() {
            gas_consumed = math::sub_u64(gas_consumed, transfer.gas_limit);
        }
        if call_type != CallType::AsynchronousCallBack {
            if self.gas_left() < gas_consumed {
                return Err(HostError::NotEnoughGas);
            }
            self.use_gas(gas_consumed);
        }

        self.output_mut().add_to_active_state(&vm_output);
        Ok((vm_output, gas_consumed))
    }
}

/// Decodes a builtin token-transfer invocation into its transfers and the
/// embedded contract call, if any.
pub fn parse_esdt_transfers(
    caller: &Address,
    recipient: &Address,
    function: &str,
    arguments: &[Vec<u8>],
) -> Option<ParsedEsdtTransfers> {
    match function {
        BUILTIN_ESDT_TRANSFER => {
            if arguments.len() < 2 {
                return None;
            }
            let transfer = EsdtTransfer {
                token_name: arguments[0].clone(),
                nonce: 0,
                value: BigUint::from_bytes_be(&arguments[1]),
                token_type: skein_vm_common::EsdtTokenType::Fungible,
            };
            let (call_function, call_arguments) = split_embedded_call(&arguments[2..]);
            Some(ParsedEsdtTransfers {
                receiver: *recipient,
                transfers: vec![transfer],
                call_function,
                call_arguments,
            })
        }
        BUILTIN_ESDT_NFT_TRANSFER => {
            if arguments.len() < 4 || caller != recipient {
                return None;
            }
            let receiver = Address::from_slice(&arguments[3])?;
            let transfer = EsdtTransfer {
                token_name: arguments[0].clone(),
                nonce: u64_from_be(&arguments[1]),
                value: BigUint::from_bytes_be(&arguments[2]),
                token_type: skein_vm_common::EsdtTokenType::NonFungible,
            };
            let (call_function, call_arguments) = split_embedded_call(&arguments[4..]);
            Some(ParsedEsdtTransfers {
                receiver,
                transfers: vec![transfer],
                call_function,
                call_arguments,
            })
        }
        BUILTIN_MULTI_ESDT_NFT_TRANSFER => {
            if arguments.len() < 2 || caller != recipient {
                return None;
            }
            let receiver = Address::from_slice(&arguments[0])?;
            let count = u64_from_be(&arguments[1]) as usize;
            let fixed = 2usize.checked_add(count.checked_mul(3)?)?;
            if arguments.len() < fixed {
                return None;
            }
            let mut transfers = Vec::with_capacity(count);
            for i in 0..count {
                let base = 2 + i * 3;
                let nonce = u64_from_be(&arguments[base + 1]);
                transfers.push(EsdtTransfer {
                    token_name: arguments[base].clone(),
                    nonce,
                    value: BigUint::from_bytes_be(&arguments[base + 2]),
                    token_type: if nonce > 0 {
                        skein_vm_common::EsdtTokenType::NonFungible
                    } else {
                        skein_vm_common::EsdtTokenType::Fungible
                    },
                });
            }
            let (call_function, call_arguments) = split_embedded_call(&arguments[fixed..]);
            Some(ParsedEsdtTransfers {
                receiver,
                transfers,
                call_function,
                call_arguments,
            })
        }
        _ => None,
    }
}

fn split_embedded_call(rest: &[Vec<u8>]) -> (Option<String>, Vec<Vec<u8>>) {
    match rest.first() {
        Some(function) if !function.is_empty() => (
            Some(String::from_utf8_lossy(function).into_owned()),
            rest[1..].to_vec(),
        ),
        _ => (None, Vec::new()),
    }
}

fn u64_from_be(bytes: &[u8]) -> u64 {
    let mut out = [0u8; 8];
    let len = bytes.len().min(8);
    out[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(out)
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn test_parse_fungible_transfer() {
        let parsed = parse_esdt_transfers(
            &addr(1),
            &addr(2),
            BUILTIN_ESDT_TRANSFER,
            &[b"WSKN-1a2b3c".to_vec(), vec![0x01, 0x00]],
        )
        .unwrap();
        assert_eq!(parsed.receiver, addr(2));
        assert_eq!(parsed.transfers.len(), 1);
        assert_eq!(parsed.transfers[0].value, BigUint::from(256u32));
        assert_eq!(parsed.transfers[0].nonce, 0);
        assert!(parsed.call_function.is_none());
    }

    #[test]
    fn test_parse_transfer_with_embedded_call() {
        let parsed = parse_esdt_transfers(
            &addr(1),
            &addr(2),
            BUILTIN_ESDT_TRANSFER,
            &[
                b"WSKN-1a2b3c".to_vec(),
                vec![0x05],
                b"swap".to_vec(),
                vec![0xAA],
            ],
        )
        .unwrap();
        assert_eq!(parsed.call_function.as_deref(), Some("swap"));
        assert_eq!(parsed.call_arguments, vec![vec![0xAA]]);
    }

    #[test]
    fn test_parse_nft_transfer_is_self_addressed() {
        let args = vec![
            b"ART-abc123".to_vec(),
            vec![0x07],
            vec![0x01],
            addr(9).as_bytes().to_vec(),
        ];
        // Not self-addressed: rejected.
        assert!(parse_esdt_transfers(&addr(1), &addr(2), BUILTIN_ESDT_NFT_TRANSFER, &args).is_none());

        let parsed =
            parse_esdt_transfers(&addr(1), &addr(1), BUILTIN_ESDT_NFT_TRANSFER, &args).unwrap();
        assert_eq!(parsed.receiver, addr(9));
        assert_eq!(parsed.transfers[0].nonce, 7);
    }

    #[test]
    fn test_parse_multi_transfer() {
        let args = vec![
            addr(9).as_bytes().to_vec(),
            vec![0x02],
            b"AAA-111111".to_vec(),
            vec![],
            vec![0x01],
            b"BBB-222222".to_vec(),
            vec![0x01],
            vec![0x02],
            b"doWork".to_vec(),
        ];
        let parsed =
            parse_esdt_transfers(&addr(1), &addr(1), BUILTIN_MULTI_ESDT_NFT_TRANSFER, &args)
                .unwrap();
        assert_eq!(parsed.transfers.len(), 2);
        assert_eq!(parsed.transfers[0].nonce, 0);
        assert_eq!(parsed.transfers[1].nonce, 1);
        assert_eq!(parsed.call_function.as_deref(), Some("doWork"));
        assert!(parsed.call_arguments.is_empty());
    }

    #[test]
    fn test_parse_multi_transfer_truncated() {
        let args = vec![addr(9).as_bytes().to_vec(), vec![0x02], b"AAA-111111".to_vec()];
        assert!(
            parse_esdt_transfers(&addr(1), &addr(1), BUILTIN_MULTI_ESDT_NFT_TRANSFER, &args)
                .is_none()
        );
    }

    #[test]
    fn test_u64_from_be() {
        assert_eq!(u64_from_be(&[]), 0);
        assert_eq!(u64_from_be(&[0x01, 0x00]), 256);
        assert_eq!(u64_from_be(&[0xFF; 9]), u64::MAX);
    }
}
