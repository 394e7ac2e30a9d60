use chainmq_typed::{
    ConnectionOptions, JobPayload, QueueOptions, RedisEngine, SchemaMap, TypedQueue,
    WorkerHandle, WorkerOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Serialize, Deserialize, Validate)]
struct SendEmail {
    #[validate(email)]
    to: String,
    #[validate(length(min = 1, max = 200))]
    subject: String,
    content: String,
}

impl JobPayload for SendEmail {
    fn name() -> &'static str {
        "sendEmail"
    }
}

#[derive(Clone, Default)]
struct EmailService;

impl EmailService {
    async fn send(&self, to: &str, subject: &str, _content: &str) -> anyhow::Result<()> {
        println!("Sent email to {}: {}", to, subject);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let engine = RedisEngine::connect(ConnectionOptions::from_env()).await?;
    let queue = TypedQueue::new(
        "emails",
        SchemaMap::new().register::<SendEmail>(),
        engine,
        QueueOptions::default(),
    )
    .await?;

    let service = Arc::new(EmailService);
    queue.handle_typed(move |job, email: SendEmail| {
        let service = Arc::clone(&service);
        async move {
            println!("[worker] job {} -> to='{}'", job.id, email.to);
            service.send(&email.to, &email.subject, &email.content).await
        }
    });

    let worker = queue
        .start_worker(WorkerOptions::default().with_concurrency(5))
        .await?;
    println!("[worker] {} started. Press Ctrl+C to stop.", worker.id());

    queue.run_until_shutdown().await?;
    println!("[worker] stopped. Goodbye.");
    Ok(())
}
