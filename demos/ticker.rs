use std::collections::HashMap;
use std::env;

use daemon_warden::{LogArg, OptionValue, Stdio, WardenDaemon};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let action = env::args().nth(1).unwrap_or_else(|| "start".to_owned());

    let mut configs: HashMap<String, OptionValue> = HashMap::new();
    configs.insert("appName".into(), OptionValue::from("ticker"));
    configs.insert("logLocation".into(), OptionValue::from("/tmp/ticker.log"));
    configs.insert(
        "appPidLocation".into(),
        OptionValue::from("/tmp/run/ticker/ticker.pid"),
    );
    configs.insert("logVerbosity".into(), OptionValue::from("debug"));
    // Keep running under the invoking identity when not root.
    configs.insert("appDieOnIdentityCrisis".into(), OptionValue::from(false));

    let mut daemon = WardenDaemon::new(configs)?;
    daemon.set_stderr(Stdio::append("/tmp/ticker.err")?);

    match action.as_str() {
        "start" => {
            if daemon.start() {
                daemon.info("entering the main loop", &[]);
                let mut tick = 0u32;
                while !daemon.is_dying() {
                    daemon.info("tick %s from pid %s", &[
                        LogArg::from(tick),
                        LogArg::from(std::process::id()),
                    ]);
                    tick += 1;
                    daemon.iterate(3.0);
                }
            }
        }
        "stop" => daemon.stop(),
        "restart" => daemon.restart(),
        "status" => match daemon.is_running() {
            Some(pid) => println!("ticker is running [{}]", pid),
            None => println!("ticker is not running"),
        },
        other => eprintln!("unknown action '{}', use start|stop|restart|status", other),
    }

    Ok(())
}
