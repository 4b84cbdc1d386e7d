// SPDX-License-Identifier: MIT
#![no_main]

use libfuzzer_sys::fuzz_target;
use shelfscan::store::DocumentRecord;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(record) = DocumentRecord::from_json(text) {
        assert!(!record.prompts.is_empty());
        assert!(record.total_cost >= 0.0);
        assert!(record.cost_per_analysis >= 0.0);

        let written = record.to_json().expect("serialize");
        let reread = DocumentRecord::from_json(&written).expect("reparse");
        assert_eq!(reread, record);
    }
});
