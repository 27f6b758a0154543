use clap::Parser;
use log::{error, info};
use plant_monitor::clock::{Scheduler, TickMultiplexer};
use plant_monitor::config::{Config, load_dotenv};
use plant_monitor::display::MemoryDisplay;
use plant_monitor::error::Result;
use plant_monitor::input::simulation::{SimulatedGpio, attach_demo_sensors};
use plant_monitor::monitor::PollLoop;
use plant_monitor::observe::{
    ClimateObservable, SensorObservable, SoilObservable, SwitchObservable,
};
use plant_monitor::screen::MonitoringScreen;
use plant_monitor::sensors::{ClimateSensor, ClimateTiming, SoilSensor, SpiAdc, Switch};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(name = "plant-monitor")]
#[command(about = "Shows smoothed climate and soil readings on a character display")]
struct Cli {
    /// JSON config file; environment variables override its values
    #[arg(long, env = "PLANT_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the base tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    if let Some(tick_ms) = cli.tick_ms {
        config.clock.tick_interval_ms = tick_ms;
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    // before any thread exists, see load_dotenv
    load_dotenv();
    let cli = Cli::parse();
    init_logger();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if cli.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize configuration: {}", e),
        }
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("Plant monitor failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting plant monitor");
    info!("Configuration loaded:");
    info!(
        "  Climate: GPIO {}, every {} ticks, window {}",
        config.climate.pin, config.climate.period_ticks, config.climate.window
    );
    info!(
        "  Soil: SPI {} input {}, every {} ticks, window {}",
        config.soil.spi_channel,
        config.soil.adc_channel,
        config.soil.period_ticks,
        config.soil.window
    );
    if config.switch.enabled {
        info!(
            "  Switch: GPIO {}, sampled every {} ticks, read every {} ticks",
            config.switch.pin, config.switch.sample_ticks, config.switch.read_ticks
        );
    }
    info!("  Tick: {} ms", config.clock.tick_interval_ms);

    // No board driver is linked in; run against the simulator.
    let gpio = Arc::new(SimulatedGpio::new());
    attach_demo_sensors(&gpio, config.climate.pin);

    let mut climate_sensor =
        ClimateSensor::new(Arc::clone(&gpio), config.climate.pin, ClimateTiming::default());
    climate_sensor.setup()?;

    let adc = SpiAdc::new(
        Arc::clone(&gpio),
        config.soil.spi_channel,
        config.soil.spi_speed_hz,
    )?;
    let mut soil_sensor = SoilSensor::new(adc, config.soil.adc_channel, config.soil.calibration);
    soil_sensor.setup()?;

    let mut climate = ClimateObservable::new(Box::new(climate_sensor), config.climate.window)?;
    let mut soil = SoilObservable::new(Box::new(soil_sensor), config.soil.window)?;

    let screen = MonitoringScreen::new(MemoryDisplay::new())?;
    screen.watch_climate(&mut climate);
    screen.watch_soil(&mut soil);

    let clock = Arc::new(TickMultiplexer::new());
    climate.start(&clock, config.climate.period_ticks)?;
    soil.start(&clock, config.soil.period_ticks)?;

    let switch = if config.switch.enabled {
        let mut switch = Switch::new(Arc::clone(&gpio), config.switch.pin);
        switch.setup()?;
        switch.start(&clock, config.switch.sample_ticks)?;
        let switch = SwitchObservable::new(Box::new(switch));
        switch.start(&clock, config.switch.read_ticks)?;
        Some(switch)
    } else {
        None
    };

    let mut scheduler = Scheduler::start(
        Arc::clone(&clock),
        Duration::from_millis(config.clock.tick_interval_ms),
    )?;

    let mut poll = PollLoop::new(Duration::from_millis(config.clock.poll_interval_ms));
    poll.add(Box::new(climate));
    poll.add(Box::new(soil));
    if let Some(switch) = switch {
        poll.add(Box::new(switch));
    }
    let running = poll.running();
    let worker = tokio::task::spawn_blocking(move || poll.run());

    info!("Plant monitor is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    scheduler.stop();
    running.store(false, Ordering::Release);
    match worker.await {
        Ok(observables) => {
            for mut observable in observables {
                observable.close();
            }
        }
        Err(e) => error!("Poll loop task failed: {}", e),
    }

    info!("Plant monitor stopped");
    Ok(())
}
