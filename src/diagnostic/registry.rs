/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,
    pub long: &'static str,
}

/// Every stable diagnostic code hdlvm emits.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "HVM-L001",
        short: "unexpected character",
        long: r#"## HVM-L001: unexpected character

The assembler met a character that starts no token. Comments begin with
`;`, integers may carry a `+`/`-` sign or a `0x`/`0b` prefix, and names
are ASCII identifiers optionally ending in `!`.

**Example:**

    add  # trailing comment

**Fix:**

    add  ; trailing comment
"#,
    },

    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "HVM-P001",
        short: "missing module header",
        long: r#"## HVM-P001: missing module header

Every assembly file starts by naming its module:

    module top

Function references inside the file are written `fn:top::name`.
"#,
    },
    ErrorEntry {
        code: "HVM-P002",
        short: "unexpected item at top level",
        long: r#"## HVM-P002: unexpected item at top level

After the module header only `enum`, `fn` and `test` items may appear.
An instruction outside any body usually means a `}` closed a body early.
"#,
    },
    ErrorEntry {
        code: "HVM-P003",
        short: "unexpected token",
        long: r#"## HVM-P003: unexpected token

A token appeared where the grammar wanted something else, for example
a missing `:` between a parameter name and its type:

    fn f(a u8) -> u8 { load 0 }

**Fix:**

    fn f(a: u8) -> u8 { load 0 }
"#,
    },
    ErrorEntry {
        code: "HVM-P004",
        short: "unexpected end of input",
        long: r#"## HVM-P004: unexpected end of input

The file ended in the middle of an item, most often a body missing its
closing `}`.
"#,
    },
    ErrorEntry {
        code: "HVM-P006",
        short: "unknown type",
        long: r#"## HVM-P006: unknown type

Types are `uN` and `sN` bit types, `bool` (an alias for `u1`), `token`,
tuples `(T, U)`, arrays `T[N]` and enums declared in the same file.
Enum underlying types must be bit types.
"#,
    },
    ErrorEntry {
        code: "HVM-P007",
        short: "unknown opcode",
        long: r#"## HVM-P007: unknown opcode

The first word of each instruction must be an opcode such as `add`,
`literal`, `load`, `store`, `call` or `jump_rel_if`.

Builtins are not opcodes. Push them as values and call them:

    literal builtin:assert_eq
    call
"#,
    },
    ErrorEntry {
        code: "HVM-P008",
        short: "bad integer",
        long: r#"## HVM-P008: bad integer

An integer operand is malformed or out of range. Decimal literals must
fit the value range of their type (`u8:0..=255`, `s8:-128..=127`); hex
and binary literals give a raw bit pattern and only need to fit the width.
Counts and slot indices are unsigned; jump offsets are signed.
"#,
    },
    ErrorEntry {
        code: "HVM-P009",
        short: "unresolved name in value",
        long: r#"## HVM-P009: unresolved name in value

A value names a function, builtin, enum or enum member that does not
exist. Function values must refer to the file's own module:

    literal fn:top::helper
"#,
    },
    ErrorEntry {
        code: "HVM-P010",
        short: "duplicate definition",
        long: r#"## HVM-P010: duplicate definition

Two functions or tests, two enums, or two members of one enum share a
name. Rename one of them.
"#,
    },

    // ── Verifier ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "HVM-V001",
        short: "jump leaves the function",
        long: r#"## HVM-V001: jump leaves the function

Jump offsets are relative to the jump itself. The target must be an
instruction of the same body:

    jump_rel_if +2   ; skips one instruction
    literal u8:0
    jump_dest        ; lands here
"#,
    },
    ErrorEntry {
        code: "HVM-V002",
        short: "jump does not land on jump_dest",
        long: r#"## HVM-V002: jump does not land on jump_dest

Every taken jump must land on a `jump_dest` instruction. At runtime a
jump elsewhere stops evaluation with an internal error (HVM-R001).
"#,
    },
    ErrorEntry {
        code: "HVM-V003",
        short: "store leaves a slot gap",
        long: r#"## HVM-V003: store leaves a slot gap

A frame's slots start with the function's parameters and grow one at a
time. A `store` may overwrite an existing slot or append the next one,
never skip ahead.
"#,
    },
    ErrorEntry {
        code: "HVM-V004",
        short: "load before store",
        long: r#"## HVM-V004: load before store

A `load` reads a slot that no earlier `store` (or parameter) defines.
"#,
    },
    ErrorEntry {
        code: "HVM-V005",
        short: "function produces no value",
        long: r#"## HVM-V005: function produces no value

A function with a return type must leave its result on the operand stack;
an empty body leaves nothing.
"#,
    },

    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "HVM-R001",
        short: "internal error",
        long: r#"## HVM-R001: internal error

The bytecode is malformed: a stack underflow, a missing operand, a slot
gap or a jump that misses its `jump_dest`. Running `hdlvm check` on the
file reports most of these statically.
"#,
    },
    ErrorEntry {
        code: "HVM-R002",
        short: "invalid argument",
        long: r#"## HVM-R002: invalid argument

An instruction received operands of the wrong kind or width, e.g. adding
a `u8` to a `u4`, indexing past the end of an array, a non-boolean jump
condition, or a call to a user function with no bytecode cache installed.
"#,
    },
    ErrorEntry {
        code: "HVM-R003",
        short: "unimplemented builtin",
        long: r#"## HVM-R003: unimplemented builtin

The program called a builtin such as `map` or `update` that the
interpreter knows by name but has no handler for.
"#,
    },
    ErrorEntry {
        code: "HVM-R004",
        short: "program failure",
        long: r#"## HVM-R004: program failure

The interpreted program failed on purpose: `assert_eq` or `assert_lt`
did not hold, or `fail!` was called. The span points at the failing call.
"#,
    },
];

/// Look up an error entry by code (e.g. `"HVM-P007"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}
