//! Fault isolation: guest panics, hook panics across many parallel
//! hosts, and the execution watchdog.

mod common;

use std::time::Duration;

use common::*;
use skein_executor::ScriptedContract;
use skein_host::{HostError, VMHostParameters};
use skein_vm_common::ReturnCode;

const OWNER: u8 = 0x0F;

#[test]
fn test_panicking_hook_returns_error_instead_of_crashing() {
    let fixture = test_host_with(VMHostParameters {
        sigsegv_passthrough: true,
        ..VMHostParameters::default()
    });
    let contract = addr(0x40);
    fixture.executors.register_contract(
        b"reader",
        ScriptedContract::new().with_export("increment", |ctx| {
            ctx.write_mem(0, b"counter");
            ctx.hooks().storage_load(0, 7, 32);
        }),
    );
    fixture.chain.put_contract(contract, b"reader", 1_000, addr(OWNER));
    fixture.chain.panic_on_storage_read.set(true);

    let result = fixture
        .host
        .run_smart_contract_call(&call(addr(1), contract, "increment"));

    assert_eq!(result.unwrap_err(), HostError::ExecutionPanicked);
}

#[test]
fn test_hundred_parallel_hosts_survive_hook_panics() {
    // Silence the default panic printer; a hundred intentional panics
    // would drown the test output.
    std::panic::set_hook(Box::new(|_| {}));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            std::thread::spawn(move || {
                let fixture = test_host_with(VMHostParameters {
                    sigsegv_passthrough: true,
                    ..VMHostParameters::default()
                });
                let contract = addr(0x41);
                fixture.executors.register_contract(
                    b"reader",
                    ScriptedContract::new().with_export("increment", |ctx| {
                        ctx.write_mem(0, b"counter");
                        ctx.hooks().storage_load(0, 7, 32);
                    }),
                );
                fixture
                    .chain
                    .put_contract(contract, b"reader", 1_000, addr(OWNER));
                fixture.chain.panic_on_storage_read.set(true);

                let result = fixture
                    .host
                    .run_smart_contract_call(&call(addr(i as u8), contract, "increment"));
                assert_eq!(result.unwrap_err(), HostError::ExecutionPanicked);
            })
        })
        .collect();

    for handle in handles {
        // A panicking driver thread would surface here as Err.
        assert!(handle.join().is_ok(), "driver observed a panic");
    }
    let _ = std::panic::take_hook();
}

#[test]
fn test_guest_fault_without_passthrough_is_execution_failed() {
    let fixture = test_host();
    let contract = addr(0x42);
    fixture.executors.register_contract(
        b"faulty",
        ScriptedContract::new().with_export("boom", |_ctx| {
            let absent: Option<u64> = None;
            let _ = absent.unwrap();
        }),
    );
    fixture.chain.put_contract(contract, b"faulty", 1_000, addr(OWNER));

    std::panic::set_hook(Box::new(|_| {}));
    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), contract, "boom"))
        .expect("a silent engine converts guest faults to traps");
    let _ = std::panic::take_hook();

    assert_eq!(output.return_code, ReturnCode::ExecutionFailed);
}

#[test]
fn test_watchdog_stops_stalled_execution() {
    let fixture = test_host_with(VMHostParameters {
        execution_timeout: Duration::from_secs(1),
        ..VMHostParameters::default()
    });
    let contract = addr(0x43);
    fixture.executors.register_contract(
        b"sleeper",
        ScriptedContract::new().with_export("stall", |ctx| {
            // The hook stalls; by the time it returns, the watchdog has
            // raised the breakpoint and the export yields.
            ctx.write_mem(0, b"slow");
            ctx.hooks().storage_load(0, 4, 32);
            assert!(ctx.interrupted());
        }),
    );
    fixture.chain.put_contract(contract, b"sleeper", 1_000, addr(OWNER));
    fixture
        .chain
        .storage_read_delay
        .set(Some(Duration::from_secs(2)));

    let started = std::time::Instant::now();
    let result = fixture
        .host
        .run_smart_contract_call(&call(addr(1), contract, "stall"));
    let elapsed = started.elapsed();

    assert_eq!(result.unwrap_err(), HostError::ExecutionFailedWithTimeout);
    // The watchdog fired at one second; the hook itself finished at two.
    // The host must have waited for the orderly unwind, not killed it.
    assert!(elapsed >= Duration::from_secs(2));
}

#[test]
fn test_spinning_guest_is_stopped_by_watchdog() {
    let fixture = test_host_with(VMHostParameters {
        execution_timeout: Duration::from_secs(1),
        ..VMHostParameters::default()
    });
    let contract = addr(0x44);
    fixture.executors.register_contract(
        b"spinner",
        ScriptedContract::new().with_export("spin", |ctx| {
            // An infinite loop, interrupted at the basic-block poll.
            ctx.spin_until_interrupted();
        }),
    );
    fixture.chain.put_contract(contract, b"spinner", 1_000, addr(OWNER));

    let result = fixture
        .host
        .run_smart_contract_call(&call(addr(1), contract, "spin"));
    assert_eq!(result.unwrap_err(), HostError::ExecutionFailedWithTimeout);
}
