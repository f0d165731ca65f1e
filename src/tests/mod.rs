mod test_builder;
mod test_comparator;
mod test_data;
mod test_distance;

/// Route `log` output through the test harness; safe to call repeatedly.
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
