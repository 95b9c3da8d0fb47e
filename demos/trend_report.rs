use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    jobtrends::example_apps::run_trend_report(std::env::args().skip(1))
}
