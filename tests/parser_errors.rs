use netqasm::core::error::NetQasmError;
use netqasm::parse_subroutine;

fn parse_err(text: &str) -> NetQasmError {
    parse_subroutine(text).unwrap_err()
}

#[test]
fn faulty_preambles_are_rejected() {
    let faulty = [
        // missing directives
        "set R0 0\n",
        "# NETQASM 0.0\nset R0 0\n",
        // duplicates
        "# NETQASM 0.0\n# NETQASM 0.0\n# APPID 0\nset R0 0\n",
        "# NETQASM 0.0\n# APPID 0\n# APPID 0\nset R0 0\n",
        // malformed version
        "# NETQASM 0\n# APPID 0\nset R0 0\n",
        "# NETQASM a.0\n# APPID 0\nset R0 0\n",
        // DEFINE arity and key problems
        "# NETQASM 0.0\n# APPID 0\n# DEFINE args\nset R0 0\n",
        "# NETQASM 0.0\n# APPID 0\n# DEFINE 1args @0\nset R0 0\n",
        "# NETQASM 0.0\n# APPID 0\n# DEFINE x @0\n# DEFINE x @1\nset R0 0\n",
    ];
    for text in faulty {
        assert!(parse_subroutine(text).is_err(), "accepted: {:?}", text);
    }
}

#[test]
fn unknown_preamble_directive_is_instruction_error() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\n# FROBNICATE x\nset R0 0\n");
    assert!(matches!(err, NetQasmError::Instruction(_)));
}

#[test]
fn preamble_after_body_is_fatal() {
    let err = parse_err("# NETQASM 0.0\nset R0 0\n# APPID 0\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));
}

#[test]
fn unknown_mnemonic_is_instruction_error() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\nfrobnicate R0\n");
    assert!(matches!(err, NetQasmError::Instruction(_)));
}

#[test]
fn unmatched_brackets_are_fatal() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\narray(10 @0\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));

    let err = parse_err("# NETQASM 0.0\n# APPID 0\nstore R0 @0[1\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));
}

#[test]
fn duplicate_branch_labels_are_fatal() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\nL:\nset R0 0\nL:\nset R0 1\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));
}

#[test]
fn register_index_out_of_range_is_fatal() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\nset R16 0\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));
}

#[test]
fn negative_instruction_argument_is_fatal() {
    let err = parse_err("# NETQASM 0.0\n# APPID 0\narray(-1) @0\n");
    assert!(matches!(err, NetQasmError::Syntax(_)));
}
