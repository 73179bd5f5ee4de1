#![no_main]

use calltrace::builder::CallTreeBuilder;
use calltrace::symbols::SymbolTable;
use libfuzzer_sys::fuzz_target;
use std::convert::Infallible;

fuzz_target!(|data: &[u8]| {
    let symbols = SymbolTable::from_symbols([
        (0x1000, 0x100, "_start"),
        (0x2000, 0x100, "f"),
        (0x3000, 0x100, "g"),
    ]);
    let mut builder = CallTreeBuilder::new(&symbols, ["_start"]);

    // Each 3-byte chunk is one stop: ip selector, ip offset, opcode byte
    for chunk in data.chunks_exact(3) {
        let ip = 0x1000 * u64::from(chunk[0] % 4 + 1) + u64::from(chunk[1]);
        let word = u64::from(chunk[2]);
        // Must never panic, whatever the stream
        let _ = builder.observe(ip, || Ok::<_, Infallible>(word));
    }

    let tree = builder.finish();
    let mut out = Vec::new();
    let _ = tree.render(&mut out);
});
