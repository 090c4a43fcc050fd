use crate::project::Project;
use infraflow_cloud::Output;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    let state = project.state.load().await?;
    let mut vault = project.vault(&state, false)?;
    let composition = project.compose(&state, &mut vault)?;

    match composition.kubeconfig {
        Output::Known(kubeconfig) => {
            print!("{}", kubeconfig);
            Ok(())
        }
        Output::Pending(pending) => Err(anyhow::anyhow!(
            "kubeconfig はまだ生成できません（{} が未記録）\nヒント: infra refresh または infra outputs set {} <value> で記録してください",
            pending,
            pending.key()
        )),
    }
}
