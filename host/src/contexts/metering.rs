//! Gas accounting.
//!
//! Gas is one monotone pool per frame. Opcode-level consumption is
//! accumulated by the executor in the instance's point counter; host-API
//! costs are charged into the same counter by the host, so
//! `gas_left = gas_for_execution - points_used` at any moment. This
//! context owns the per-frame budgets (initial deduction, locked callback
//! gas, schedule snapshot) and the optional gas tracer; the point counter
//! itself lives on the instance and is threaded in by the host.

use std::collections::BTreeMap;

use skein_vm_common::{math, CallType, VMInput};

use crate::error::{HostError, HostResult};
use crate::gas::GasSchedule;
use crate::state_stack::StateStack;

/// Per-SC, per-API vectors of individual gas charges.
pub type GasTraceMap = BTreeMap<String, BTreeMap<String, Vec<u64>>>;

#[derive(Debug, Default, Clone)]
struct MeteringFrame {
    gas_provided: u64,
    gas_locked: u64,
    initial_cost: u64,
    gas_for_execution: u64,
}

/// The metering context.
#[derive(Debug, Default)]
pub struct MeteringContext {
    schedule: GasSchedule,
    frame: MeteringFrame,
    state_stack: Vec<MeteringFrame>,
    gas_tracing: bool,
    gas_trace: GasTraceMap,
}

impl MeteringContext {
    /// Creates a context with the given schedule.
    pub fn new(schedule: GasSchedule) -> Self {
        MeteringContext {
            schedule,
            ..MeteringContext::default()
        }
    }

    /// The schedule captured for the current call.
    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Swaps the schedule; takes effect for subsequent calls.
    pub fn set_schedule(&mut self, schedule: GasSchedule) {
        self.schedule = schedule;
    }

    /// Initializes the frame from a call input.
    ///
    /// On the callback leg the locked gas becomes spendable: it was
    /// reserved for exactly this execution.
    pub fn init_from_input(&mut self, input: &VMInput) {
        let mut gas_provided = input.gas_provided;
        let mut gas_locked = input.gas_locked;
        if input.call_type == CallType::AsynchronousCallBack {
            gas_provided = math::add_u64(gas_provided, gas_locked);
            gas_locked = 0;
        }
        self.frame = MeteringFrame {
            gas_provided,
            gas_locked,
            initial_cost: 0,
            gas_for_execution: gas_provided,
        };
    }

    fn deduct_initial_gas(&mut self, code_len: u64, base: u64, per_byte: u64) -> HostResult<()> {
        let cost = math::add_u64(base, math::mul_u64(code_len, per_byte));
        if cost > self.frame.gas_provided {
            return Err(HostError::NotEnoughGas);
        }
        self.frame.initial_cost = cost;
        self.frame.gas_for_execution = math::sub_u64(self.frame.gas_provided, cost);
        Ok(())
    }

    /// One-time cost of running existing code, proportional to its size.
    pub fn deduct_initial_gas_for_execution(&mut self, code_len: u64) -> HostResult<()> {
        let per_byte = self.schedule.base_operation_cost.compile_per_byte;
        self.deduct_initial_gas(code_len, 0, per_byte)
    }

    /// One-time cost of a transaction-level deployment.
    pub fn deduct_initial_gas_for_direct_deployment(&mut self, code_len: u64) -> HostResult<()> {
        let base = self.schedule.api_cost.create_contract;
        let per_byte = math::add_u64(
            self.schedule.base_operation_cost.compile_per_byte,
            self.schedule.base_operation_cost.store_per_byte,
        );
        self.deduct_initial_gas(code_len, base, per_byte)
    }

    /// One-time cost of a contract-initiated deployment.
    pub fn deduct_initial_gas_for_indirect_deployment(&mut self, code_len: u64) -> HostResult<()> {
        let per_byte = math::add_u64(
            self.schedule.base_operation_cost.compile_per_byte,
            self.schedule.base_operation_cost.store_per_byte,
        );
        self.deduct_initial_gas(code_len, 0, per_byte)
    }

    /// Gas available for opcode metering and API charges.
    pub fn gas_for_execution(&self) -> u64 {
        self.frame.gas_for_execution
    }

    /// Gas provided to the frame, after callback unlocking.
    pub fn gas_provided(&self) -> u64 {
        self.frame.gas_provided
    }

    /// Gas reserved for the async callback of this frame.
    pub fn gas_locked(&self) -> u64 {
        self.frame.gas_locked
    }

    /// Remaining gas, given the instance's consumed points.
    pub fn gas_left(&self, points_used: u64) -> u64 {
        math::sub_u64(self.frame.gas_for_execution, points_used)
    }

    /// Total gas this frame has spent, given the instance's points.
    pub fn gas_spent_by_contract(&self, points_used: u64) -> u64 {
        math::add_u64(self.frame.initial_cost, points_used)
    }

    /// Caps a requested gas forward at what the frame still has.
    pub fn bound_gas_limit(&self, requested: u64, points_used: u64) -> u64 {
        requested.min(self.gas_left(points_used))
    }

    /// Records one charge in the tracer, when enabled.
    pub fn trace_gas_used(&mut self, sc_address: &[u8], api_name: &str, gas: u64) {
        if !self.gas_tracing {
            return;
        }
        self.gas_trace
            .entry(hex::encode(sc_address))
            .or_default()
            .entry(api_name.to_string())
            .or_default()
            .push(gas);
    }

    /// Enables or disables gas tracing.
    pub fn set_gas_tracing(&mut self, enabled: bool) {
        self.gas_tracing = enabled;
        if !enabled {
            self.gas_trace.clear();
        }
    }

    /// True when tracing is on.
    pub fn is_gas_tracing(&self) -> bool {
        self.gas_tracing
    }

    /// The accumulated trace.
    pub fn gas_trace(&self) -> &GasTraceMap {
        &self.gas_trace
    }

    /// Pops the parent frame and keeps the tracer accumulated across the
    /// child call. Numeric budgets return to the parent's; the gas the
    /// child actually consumed already lives in the parent's point counter
    /// (charged up-front when the child was opened).
    pub fn pop_merge_active_state(&mut self) {
        self.pop_set_active_state();
    }
}

impl StateStack for MeteringContext {
    fn init_state(&mut self) {
        self.frame = MeteringFrame::default();
    }

    fn push_state(&mut self) {
        self.state_stack.push(self.frame.clone());
    }

    fn pop_set_active_state(&mut self) {
        if let Some(frame) = self.state_stack.pop() {
            self.frame = frame;
        }
    }

    fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with_gas(gas_provided: u64, gas_locked: u64, call_type: CallType) -> VMInput {
        VMInput {
            gas_provided,
            gas_locked,
            call_type,
            ..VMInput::default()
        }
    }

    #[test]
    fn test_initial_deduction() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.init_from_input(&input_with_gas(10_000_000, 0, CallType::DirectCall));

        metering.deduct_initial_gas_for_execution(100).unwrap();
        let per_byte = metering.schedule().base_operation_cost.compile_per_byte;
        assert_eq!(metering.gas_for_execution(), 10_000_000 - 100 * per_byte);
        assert_eq!(metering.gas_spent_by_contract(0), 100 * per_byte);
    }

    #[test]
    fn test_initial_deduction_out_of_gas() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.init_from_input(&input_with_gas(10, 0, CallType::DirectCall));
        assert_eq!(
            metering.deduct_initial_gas_for_execution(1_000).unwrap_err(),
            HostError::NotEnoughGas
        );
    }

    #[test]
    fn test_gas_left_and_bound() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.init_from_input(&input_with_gas(100_000, 0, CallType::DirectCall));

        assert_eq!(metering.gas_left(0), 100_000);
        assert_eq!(metering.gas_left(40_000), 60_000);
        assert_eq!(metering.bound_gas_limit(1_000_000, 40_000), 60_000);
        assert_eq!(metering.bound_gas_limit(10, 40_000), 10);
        // Points past the budget saturate to zero remaining.
        assert_eq!(metering.gas_left(200_000), 0);
    }

    #[test]
    fn test_callback_unlocks_gas() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.init_from_input(&input_with_gas(50_000, 20_000, CallType::AsynchronousCallBack));
        assert_eq!(metering.gas_for_execution(), 70_000);
        assert_eq!(metering.gas_locked(), 0);

        metering.init_from_input(&input_with_gas(50_000, 20_000, CallType::AsynchronousCall));
        assert_eq!(metering.gas_for_execution(), 50_000);
        assert_eq!(metering.gas_locked(), 20_000);
    }

    #[test]
    fn test_frame_stack_restores_budgets() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.init_from_input(&input_with_gas(100_000, 0, CallType::DirectCall));

        metering.push_state();
        metering.init_from_input(&input_with_gas(30_000, 0, CallType::DirectCall));
        assert_eq!(metering.gas_for_execution(), 30_000);

        metering.pop_merge_active_state();
        assert_eq!(metering.gas_for_execution(), 100_000);
    }

    #[test]
    fn test_gas_trace_shape() {
        let mut metering = MeteringContext::new(GasSchedule::default());
        metering.set_gas_tracing(true);
        metering.trace_gas_used(&[1u8; 32], "storageStore", 100);
        metering.trace_gas_used(&[1u8; 32], "storageStore", 250);
        metering.trace_gas_used(&[1u8; 32], "finish", 10);

        let trace = metering.gas_trace();
        let sc = trace.get(&hex::encode([1u8; 32])).unwrap();
        assert_eq!(sc.get("storageStore").unwrap(), &vec![100, 250]);
        assert_eq!(sc.get("finish").unwrap(), &vec![10]);

        metering.set_gas_tracing(false);
        assert!(metering.gas_trace().is_empty());
    }
}
