#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = aid_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // Anything that validates must also build a controller.
        let built = aid_core::LoopController::builder()
            .with_config(aid_core::LoopCfg::from(&cfg))
            .try_build();
        assert!(built.is_ok(), "validated config rejected by builder");
    }
});
