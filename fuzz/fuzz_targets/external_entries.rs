#![no_main]

use libfuzzer_sys::fuzz_target;
use tensorpack::ExternalDataInfo;

fuzz_target!(|entries: Vec<(String, String)>| {
    // Invariant: anything that parses survives emit-then-parse unchanged.
    if let Ok(info) = ExternalDataInfo::from_entries(&entries) {
        let again = ExternalDataInfo::from_entries(&info.to_entries()).expect("emitted entries parse");
        assert_eq!(again, info);
    }
});
