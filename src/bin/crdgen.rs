use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&klodd::crds::Challenge::crd())?);
    Ok(())
}
