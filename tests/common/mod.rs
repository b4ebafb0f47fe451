//! WAT guests shared by the integration tests.
//!
//! Every guest gets the same prelude: a bump `allocate` that grows memory
//! when it runs out, a no-op `deallocate`, `$emit` (copy static bytes into a
//! fresh region) and `$wrap` (a fresh region holding static bytes, then the
//! bytes of another region, then more static bytes). Static byte strings are
//! laid out as data segments in the first page; the heap starts on the
//! second.

#![allow(dead_code)]

use mocknet::AbiAdapter;
use mocknet_std::Binary;
use serde_json::Value;

const DATA_START: u32 = 1024;
const HEAP_START: u32 = 65536;

const PRELUDE: &str = r#"
    (func $allocate (export "allocate") (param $len i32) (result i32)
        (local $region i32)
        (local $end i32)
        (local.set $region (global.get $heap))
        (local.set $end
            (i32.add (i32.add (local.get $region) (i32.const 12)) (local.get $len)))
        (if (i32.gt_u (local.get $end) (i32.shl (memory.size) (i32.const 16)))
            (then
                (drop (memory.grow
                    (i32.add
                        (i32.shr_u
                            (i32.sub (local.get $end) (i32.shl (memory.size) (i32.const 16)))
                            (i32.const 16))
                        (i32.const 1))))))
        (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
        (i32.store offset=4 (local.get $region) (local.get $len))
        (i32.store offset=8 (local.get $region) (i32.const 0))
        (global.set $heap (i32.and (i32.add (local.get $end) (i32.const 3)) (i32.const -4)))
        (local.get $region))

    (func (export "deallocate") (param i32))

    (func $emit (param $ptr i32) (param $len i32) (result i32)
        (local $region i32)
        (local.set $region (call $allocate (local.get $len)))
        (memory.copy (i32.load (local.get $region)) (local.get $ptr) (local.get $len))
        (i32.store offset=8 (local.get $region) (local.get $len))
        (local.get $region))

    (func $wrap (param $pre i32) (param $pre_len i32) (param $inner i32)
                (param $post i32) (param $post_len i32) (result i32)
        (local $inner_len i32)
        (local $total i32)
        (local $region i32)
        (local $out i32)
        (local.set $inner_len (i32.load offset=8 (local.get $inner)))
        (local.set $total
            (i32.add (i32.add (local.get $pre_len) (local.get $inner_len)) (local.get $post_len)))
        (local.set $region (call $allocate (local.get $total)))
        (local.set $out (i32.load (local.get $region)))
        (memory.copy (local.get $out) (local.get $pre) (local.get $pre_len))
        (memory.copy
            (i32.add (local.get $out) (local.get $pre_len))
            (i32.load (local.get $inner))
            (local.get $inner_len))
        (memory.copy
            (i32.add (i32.add (local.get $out) (local.get $pre_len)) (local.get $inner_len))
            (local.get $post)
            (local.get $post_len))
        (i32.store offset=8 (local.get $region) (local.get $total))
        (local.get $region))
"#;

fn import_signature(name: &str) -> &'static str {
    match name {
        "db_read" | "query_chain" | "addr_validate" => "(param i32) (result i32)",
        "db_write" => "(param i32 i32)",
        "db_remove" | "debug" | "abort" => "(param i32)",
        "canonicalize_address" | "humanize_address" | "addr_canonicalize" | "addr_humanize" => {
            "(param i32 i32) (result i32)"
        }
        "secp256k1_verify" | "ed25519_verify" | "ed25519_batch_verify" => {
            "(param i32 i32 i32) (result i32)"
        }
        other => panic!("no signature for import `{other}`"),
    }
}

/// Static bytes placed in the guest's data section.
#[derive(Debug, Clone, Copy)]
pub struct Bytes {
    pub ptr: u32,
    pub len: u32,
}

impl Bytes {
    /// Expression for a fresh region holding these bytes.
    pub fn emit(self) -> String {
        format!("(call $emit (i32.const {}) (i32.const {}))", self.ptr, self.len)
    }
}

pub struct GuestWat {
    imports: Vec<String>,
    data: Vec<String>,
    funcs: Vec<String>,
    next: u32,
    ok_open: Bytes,
    close: Bytes,
}

impl GuestWat {
    pub fn new(imports: &[&str]) -> Self {
        let mut guest = Self {
            imports: imports
                .iter()
                .map(|name| {
                    format!(
                        r#"(import "env" "{name}" (func ${name} {}))"#,
                        import_signature(name)
                    )
                })
                .collect(),
            data: Vec::new(),
            funcs: Vec::new(),
            next: DATA_START,
            ok_open: Bytes { ptr: 0, len: 0 },
            close: Bytes { ptr: 0, len: 0 },
        };
        guest.ok_open = guest.bytes(br#"{"ok":"#);
        guest.close = guest.bytes(b"}");
        guest
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Bytes {
        let ptr = self.next;
        let len = bytes.len() as u32;
        assert!(ptr + len < HEAP_START, "static data overflows the first page");

        let escaped: String = bytes.iter().map(|b| format!("\\{b:02x}")).collect();
        self.data
            .push(format!(r#"(data (i32.const {ptr}) "{escaped}")"#));
        self.next = (ptr + len + 7) & !7;
        Bytes { ptr, len }
    }

    /// Expression for a fresh region holding `json`.
    pub fn reply(&mut self, json: &str) -> String {
        self.bytes(json.as_bytes()).emit()
    }

    /// Expression for `{"ok":<bytes of region>}`.
    pub fn ok_around(&self, region: &str) -> String {
        self.wrap(self.ok_open, region, self.close)
    }

    pub fn wrap(&self, pre: Bytes, region: &str, post: Bytes) -> String {
        format!(
            "(call $wrap (i32.const {}) (i32.const {}) {region} (i32.const {}) (i32.const {}))",
            pre.ptr, pre.len, post.ptr, post.len
        )
    }

    pub fn func(&mut self, text: impl Into<String>) {
        self.funcs.push(text.into());
    }

    /// The three entry points with the parameter lists `abi` calls them
    /// with. Bodies may use `$env` and `$msg`, and `$info` under v1;
    /// `locals` is spliced into each function.
    pub fn entry_points(
        &mut self,
        abi: AbiAdapter,
        locals: &str,
        instantiate: &str,
        execute: &str,
        query: &str,
    ) {
        let (init_name, exec_name, full, query_params) = match abi {
            AbiAdapter::V0 => (
                "init",
                "handle",
                "(param $env i32) (param $msg i32)",
                "(param $msg i32)",
            ),
            AbiAdapter::V1 => (
                "instantiate",
                "execute",
                "(param $env i32) (param $info i32) (param $msg i32)",
                "(param $env i32) (param $msg i32)",
            ),
        };
        self.func(format!(
            r#"(func (export "{init_name}") {full} (result i32) {locals} {instantiate})"#
        ));
        self.func(format!(
            r#"(func (export "{exec_name}") {full} (result i32) {locals} {execute})"#
        ));
        self.func(format!(
            r#"(func (export "query") {query_params} (result i32) {locals} {query})"#
        ));
    }

    pub fn text(&self) -> String {
        format!(
            "(module\n{}\n(memory (export \"memory\") 2)\n(global $heap (mut i32) (i32.const {HEAP_START}))\n{}\n{PRELUDE}\n{}\n)",
            self.imports.join("\n"),
            self.data.join("\n"),
            self.funcs.join("\n"),
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let text = self.text();
        wat::parse_str(&text).unwrap_or_else(|e| panic!("invalid guest: {e}\n{text}"))
    }
}

/// Records what it is called with and answers with its own message.
///
/// - instantiate stores env, info and msg under `env`, `info` and `init`
/// - execute stores them under `last_env`, `last_info` and `last_msg`
/// - every entry point answers `{"ok":<msg>}`, so the message doubles as
///   the response, and a query message that is a base64 JSON string
///   comes back decoded
///
/// Under v0 there is no `info`; the sender is part of `env`.
pub fn echo(abi: AbiAdapter) -> Vec<u8> {
    let mut guest = GuestWat::new(&["db_write"]);
    let keys = ["env", "info", "init", "last_env", "last_info", "last_msg"]
        .map(|key| guest.bytes(key.as_bytes()).emit());
    let [env, info, init, last_env, last_info, last_msg] = keys;

    let store_info = |key: &str| match abi {
        AbiAdapter::V0 => String::new(),
        AbiAdapter::V1 => format!("(call $db_write {key} (local.get $info))"),
    };
    let answer = guest.ok_around("(local.get $msg)");

    let instantiate = format!(
        "(call $db_write {env} (local.get $env)) {} (call $db_write {init} (local.get $msg)) {answer}",
        store_info(&info)
    );
    let execute = format!(
        "(call $db_write {last_env} (local.get $env)) {} (call $db_write {last_msg} (local.get $msg)) {answer}",
        store_info(&last_info)
    );
    guest.entry_points(abi, "", &instantiate, &execute, &answer);
    guest.build()
}

/// Instantiate stores its message under `init` and answers with an empty
/// response, whatever the message was.
pub fn recorder() -> Vec<u8> {
    let mut guest = GuestWat::new(&["db_write"]);
    let init = guest.bytes(b"init").emit();
    let ok = guest.reply(r#"{"ok":{}}"#);

    let instantiate = format!("(call $db_write {init} (local.get $msg)) {ok}");
    guest.entry_points(AbiAdapter::V1, "", &instantiate, &ok, &ok);
    guest.build()
}

/// Execute sends its message to `query_chain` and stores the reply under
/// `reply`.
pub fn forwarder(abi: AbiAdapter) -> Vec<u8> {
    let mut guest = GuestWat::new(&["db_write", "query_chain"]);
    let reply_key = guest.bytes(b"reply").emit();
    let ok = guest.reply(&ok_envelope(abi, "{}"));
    let answer = guest.reply(&ok_envelope(abi, "\"e30=\""));

    let execute = format!("(call $db_write {reply_key} (call $query_chain (local.get $msg))) {ok}");
    guest.entry_points(abi, "", &ok, &execute, &answer);
    guest.build()
}

/// Instantiates fine; execute and query hit `unreachable`.
pub fn trapper() -> Vec<u8> {
    let mut guest = GuestWat::new(&[]);
    let ok = guest.reply(r#"{"ok":{}}"#);
    guest.entry_points(AbiAdapter::V1, "", &ok, "(unreachable)", "(unreachable)");
    guest.build()
}

/// Execute and query answer with a contract error.
pub fn rejecter() -> Vec<u8> {
    let mut guest = GuestWat::new(&[]);
    let ok = guest.reply(r#"{"ok":{}}"#);
    let err = guest.reply(r#"{"err":{"generic_err":{"msg":"nope"}}}"#);
    guest.entry_points(AbiAdapter::V1, "", &ok, &err, &err);
    guest.build()
}

/// Execute answers with a response that executes `target` again.
pub fn pinger(target: &str) -> Vec<u8> {
    let mut guest = GuestWat::new(&[]);
    let ok = guest.reply(r#"{"ok":{}}"#);
    let ping = guest.reply(&format!(
        r#"{{"ok":{{"messages":[{{"wasm":{{"execute":{{"contract_addr":"{target}","callback_code_hash":"","msg":"e30=","send":[]}}}}}}]}}}}"#
    ));
    guest.entry_points(AbiAdapter::V1, "", &ok, &ping, &ok);
    guest.build()
}

/// Instantiate writes `k` = `v`. Execute reads `k` into `seen` (or
/// `none` when it is absent) and then removes `k`.
pub fn storage_keeper() -> Vec<u8> {
    let mut guest = GuestWat::new(&["db_read", "db_write", "db_remove"]);
    let k = guest.bytes(b"k").emit();
    let v = guest.bytes(b"v").emit();
    let seen = guest.bytes(b"seen").emit();
    let none = guest.bytes(b"none").emit();
    let ok = guest.reply(r#"{"ok":{}}"#);

    let instantiate = format!("(call $db_write {k} {v}) {ok}");
    let execute = format!(
        r#"(local.set $value (call $db_read {k}))
           (if (i32.eqz (local.get $value))
               (then (call $db_write {seen} {none}))
               (else (call $db_write {seen} (local.get $value))))
           (call $db_remove {k})
           {ok}"#
    );
    guest.entry_points(AbiAdapter::V1, "(local $value i32)", &instantiate, &execute, &ok);
    guest.build()
}

/// Instantiate writes `blob` under `blob`. Execute reads it back and
/// writes what it got under `copy`.
pub fn blob_keeper(blob: &[u8]) -> Vec<u8> {
    let mut guest = GuestWat::new(&["db_read", "db_write"]);
    let blob_key = guest.bytes(b"blob").emit();
    let copy_key = guest.bytes(b"copy").emit();
    let blob = guest.bytes(blob).emit();
    let ok = guest.reply(r#"{"ok":{}}"#);

    let instantiate = format!("(call $db_write {blob_key} {blob}) {ok}");
    let execute = format!("(call $db_write {copy_key} (call $db_read {blob_key})) {ok}");
    guest.entry_points(AbiAdapter::V1, "", &instantiate, &execute, &ok);
    guest.build()
}

/// Execute canonicalizes `human`. On success the canonical bytes go to
/// `canonical` and their humanized form to `human`; on failure the error
/// message goes to `error`.
pub fn address_book(abi: AbiAdapter, human: &str) -> Vec<u8> {
    let (canonicalize, humanize) = match abi {
        AbiAdapter::V0 => ("canonicalize_address", "humanize_address"),
        AbiAdapter::V1 => ("addr_canonicalize", "addr_humanize"),
    };
    let mut guest = GuestWat::new(&["db_write", canonicalize, humanize]);
    let source = guest.bytes(human.as_bytes()).emit();
    let canonical_key = guest.bytes(b"canonical").emit();
    let human_key = guest.bytes(b"human").emit();
    let error_key = guest.bytes(b"error").emit();
    let ok = guest.reply(&ok_envelope(abi, "{}"));
    let answer = guest.reply(&ok_envelope(abi, "\"e30=\""));

    let execute = format!(
        r#"(local.set $out (call $allocate (i32.const 64)))
           (local.set $error (call ${canonicalize} {source} (local.get $out)))
           (if (local.get $error)
               (then (call $db_write {error_key} (local.get $error)))
               (else
                   (call $db_write {canonical_key} (local.get $out))
                   (local.set $back (call $allocate (i32.const 128)))
                   (drop (call ${humanize} (local.get $out) (local.get $back)))
                   (call $db_write {human_key} (local.get $back))))
           {ok}"#
    );
    guest.entry_points(
        abi,
        "(local $out i32) (local $error i32) (local $back i32)",
        &ok,
        &execute,
        &answer,
    );
    guest.build()
}

/// Execute prints through `debug` and pokes the stubbed imports.
pub fn chatter() -> Vec<u8> {
    let mut guest = GuestWat::new(&["debug", "addr_validate", "secp256k1_verify"]);
    let hello = guest.bytes(b"hello from the guest").emit();
    let address = guest.bytes(b"secret1whoever").emit();
    let ok = guest.reply(r#"{"ok":{}}"#);

    let execute = format!(
        "(call $debug {hello})
         (drop (call $addr_validate {address}))
         (drop (call $secp256k1_verify (i32.const 0) (i32.const 0) (i32.const 0)))
         {ok}"
    );
    guest.entry_points(AbiAdapter::V1, "", &ok, &execute, &ok);
    guest.build()
}

/// Execute calls `abort` with "boom".
pub fn aborter() -> Vec<u8> {
    let mut guest = GuestWat::new(&["abort"]);
    let boom = guest.bytes(b"boom").emit();
    let ok = guest.reply(r#"{"ok":{}}"#);
    let execute = format!("(call $abort {boom}) (unreachable)");
    guest.entry_points(AbiAdapter::V1, "", &ok, &execute, &ok);
    guest.build()
}

fn ok_envelope(abi: AbiAdapter, inner: &str) -> String {
    match abi {
        AbiAdapter::V0 => format!(r#"{{"Ok":{inner}}}"#),
        AbiAdapter::V1 => format!(r#"{{"ok":{inner}}}"#),
    }
}

/// `value` as JSON, base64 encoded, the way messages travel inside other
/// messages.
pub fn b64(value: &Value) -> String {
    Binary::encode_json(value)
        .expect("serializable")
        .to_base64()
}

/// Stored bytes parsed as JSON.
pub fn stored_json(storage: &std::collections::BTreeMap<Vec<u8>, Vec<u8>>, key: &str) -> Value {
    let bytes = storage
        .get(key.as_bytes())
        .unwrap_or_else(|| panic!("nothing stored under `{key}`"));
    serde_json::from_slice(bytes).expect("stored JSON")
}
