use netqasm::core::error::NetQasmError;
use netqasm::core::executor::{NoopBackend, Processor};
use netqasm::core::subroutine::{Register, RegisterName};
use netqasm::parse_subroutine;

fn processor() -> Processor {
    let mut processor = Processor::new(0, Box::new(NoopBackend));
    processor.init_new_application(0, 5);
    processor
}

fn run(processor: &mut Processor, text: &str) -> Result<u64, NetQasmError> {
    processor.execute_subroutine(parse_subroutine(text).unwrap())
}

fn register_value(processor: &Processor, name: RegisterName, index: u32) -> Option<i64> {
    let handle = processor.shared_memory(0).unwrap();
    let memory = handle.lock().unwrap();
    memory.get_register(Register::new(name, index).unwrap())
}

#[test]
fn macro_expanded_program_stores_through_array() {
    let mut processor = processor();
    run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
# DEFINE epr_address @1
array(1) epr_address!
store epr_address![0] 1
",
    )
    .unwrap();
    let handle = processor.shared_memory(0).unwrap();
    let memory = handle.lock().unwrap();
    assert_eq!(memory.get_array_entry(1, 0).unwrap(), Some(1));
}

#[test]
fn all_branch_variants_follow_resolve_compare_jump() {
    let mut processor = processor();
    run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
set R0 5
bne R0 5 BAD
blt R0 6 OK1
beq 0 0 BAD
OK1:
bge R0 5 OK2
beq 0 0 BAD
OK2:
set R1 1
beq 0 0 END
BAD:
set R1 99
END:
",
    )
    .unwrap();
    assert_eq!(register_value(&processor, RegisterName::R, 1), Some(1));
}

#[test]
fn loop_via_addm_wraps_modulus() {
    let mut processor = processor();
    run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
set R0 1
addm R1 R0 1 2
",
    )
    .unwrap();
    assert_eq!(register_value(&processor, RegisterName::R, 1), Some(0));
}

#[test]
fn store_into_full_array_slot_twice_is_allowed() {
    let mut processor = processor();
    run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
array(1) @0
store @0[0] 1
store @0[0] 2
",
    )
    .unwrap();
    let handle = processor.shared_memory(0).unwrap();
    assert_eq!(handle.lock().unwrap().get_array_entry(0, 0).unwrap(), Some(2));
}

#[test]
fn omitted_index_fills_first_unset_entry() {
    let mut processor = processor();
    run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
array(3) @0
store @0 10
store @0 11
",
    )
    .unwrap();
    let handle = processor.shared_memory(0).unwrap();
    let memory = handle.lock().unwrap();
    assert_eq!(memory.get_array_entry(0, 0).unwrap(), Some(10));
    assert_eq!(memory.get_array_entry(0, 1).unwrap(), Some(11));
    assert_eq!(memory.get_array_entry(0, 2).unwrap(), None);
}

#[test]
fn omitted_index_with_no_unset_entry_is_fatal() {
    let mut processor = processor();
    let err = run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
array(1) @0
store @0 10
store @0 11
",
    )
    .unwrap_err();
    assert!(matches!(err, NetQasmError::Resource(_)));
}

#[test]
fn reading_unset_register_is_type_error() {
    let mut processor = processor();
    let err = run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 0
add R0 R1 1
",
    )
    .unwrap_err();
    assert!(matches!(err, NetQasmError::Type(_)));
}

#[test]
fn subroutine_for_uninitialized_app_fails() {
    let mut processor = Processor::new(0, Box::new(NoopBackend));
    let err = run(
        &mut processor,
        "\
# NETQASM 0.0
# APPID 3
set R0 0
",
    )
    .unwrap_err();
    assert!(matches!(err, NetQasmError::Resource(_)));
}
