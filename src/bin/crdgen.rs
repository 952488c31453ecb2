#[allow(dead_code)]
#[path = "../types.rs"]
mod types;

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    println!("{}", serde_yaml::to_string(&types::Descheduler::crd())?);
    Ok(())
}
