use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("task '{0}' exhausted its restart budget and was not relaunched")]
    RestartBudgetExhausted(String),
}
