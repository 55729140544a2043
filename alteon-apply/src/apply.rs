use std::path::PathBuf;

use crate::device::{parse_device, DeviceLocal};
use crate::options::Options;
use alteon_reconcile::{execute, Failure, Invocation, Mode};
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The object type to manage, see `alteon-apply types`
    #[arg(long("type"))]
    object_type: String,

    /// The desired state of the object [default: present]
    #[arg(long)]
    state: Option<Mode>,

    /// A JSON file with a whole invocation
    ///
    /// This is an object with the fields `state`, `parameters`,
    /// `revert_on_error`, `write_on_change` and `dry_run`, all optional.
    /// Flags given on the command line take precedence.
    #[arg(long)]
    invocation_file: Option<PathBuf>,

    /// The (whole) JSON parameters of the object
    #[arg(long("parameters-json"), conflicts_with = "invocation_file")]
    parameters_json: Option<String>,

    /// An individual parameter, in JSON format
    #[arg(long("param-json"), short('j'), number_of_values = 2, value_names = &["NAME", "JSON"])]
    param_json: Vec<String>,

    /// An individual parameter, as a raw string.
    ///
    /// This is equivalent to `--param-json NAME JSON` if JSON is the JSON string formatting of STR.
    #[arg(long("param-str"), short('s'), number_of_values = 2, value_names = &["NAME", "STR"])]
    param_str: Vec<String>,

    /// Roll back the device's uncommitted changes if the invocation fails
    #[arg(long)]
    revert_on_error: bool,

    /// Only commit when this invocation changed something
    #[arg(long)]
    write_on_change: bool,

    /// Report what would change without changing it
    #[arg(long)]
    dry_run: bool,

    /// The device to work on, as a JSON descriptor such as
    /// `{"type": "local", "path": "alteon.json"}`
    #[arg(long("device-json"), conflicts_with = "device")]
    device_json: Option<String>,

    /// Path of a local device journal
    #[arg(long)]
    device: Option<PathBuf>,
}

/// Run the `apply` command.
///
/// Prints the outcome as JSON on stdout. An engine failure is printed the same
/// way before being returned.
pub(crate) fn apply(_options: &Options, args: &Args) -> Result<()> {
    let invocation = invocation(args)?;
    let device = device(args)?.open()?;
    let mut configurator = alteon_configurators::configurator_for(&args.object_type, device.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "unknown object type {}, see `alteon-apply types`",
                args.object_type
            )
        })?;
    let mut session = device;

    match execute(&invocation, &mut configurator, &mut session) {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&Failure::from(&error))?);
            Err(error.into())
        }
    }
}

fn invocation(args: &Args) -> Result<Invocation> {
    let mut invocation = match &args.invocation_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading invocation file {}", path.display()))?;
            serde_json::from_str::<Invocation>(&text)
                .with_context(|| format!("parsing invocation file {}", path.display()))?
        }
        None => Invocation::default(),
    };
    if let Some(json_string) = &args.parameters_json {
        invocation.parameters = serde_json::from_str(json_string)
            .context("failed to parse value of --parameters-json")?;
    }
    invocation.parameters = Value::Object(parameters(
        std::mem::take(&mut invocation.parameters),
        &args.param_json,
        &args.param_str,
    )?);

    if let Some(state) = args.state {
        invocation.state = state;
    }
    invocation.revert_on_error |= args.revert_on_error;
    invocation.write_on_change |= args.write_on_change;
    invocation.dry_run |= args.dry_run;
    debug!(?invocation, "invocation");
    Ok(invocation)
}

/// Add the individual parameters to `base`.
///
/// clap does not tell us the order of the flags, so a later parameter cannot
/// override an earlier one. Duplicates are rejected instead.
fn parameters(base: Value, param_json: &[String], param_str: &[String]) -> Result<Map<String, Value>> {
    let mut params = match base {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => bail!("parameters must be a JSON object, got {}", other),
    };

    let mut insert = |k: &String, v: Value| -> Result<()> {
        if params.contains_key(k) {
            bail!("duplicate parameter: {}", k);
        }
        params.insert(k.clone(), v);
        Ok(())
    };
    for pair in param_json.chunks_exact(2) {
        let (k, v) = (&pair[0], &pair[1]);
        let value = serde_json::from_str(v)
            .with_context(|| format!("failed to parse JSON value for parameter: {}", k))?;
        insert(k, value)?;
    }
    for pair in param_str.chunks_exact(2) {
        insert(&pair[0], Value::String(pair[1].clone()))?;
    }
    Ok(params)
}

fn device(args: &Args) -> Result<DeviceLocal> {
    match (&args.device_json, &args.device) {
        (Some(json_string), _) => {
            let value: Value =
                serde_json::from_str(json_string).context("failed to parse value of --device-json")?;
            parse_device(&value)
        }
        (None, Some(path)) => Ok(DeviceLocal::at(path.clone())),
        (None, None) => bail!("no device given, use --device or --device-json"),
    }
}
