use chainmq_typed::{
    BackoffStrategy, ConnectionOptions, JobOptions, JobPayload, QueueOptions, RedisEngine,
    SchemaMap, TypedQueue, TypedQueueError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
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

    let job = queue
        .add(&SendEmail {
            to: "user@example.com".into(),
            subject: "Welcome!".into(),
            content: "Thanks for signing up".into(),
        })
        .await?;
    println!("[enqueue] sendEmail id={}", job.id);

    let opts = JobOptions::default()
        .with_delay_secs(60)
        .with_attempts(5)
        .with_backoff(BackoffStrategy::Linear { increment: 10, cap: 120 });
    let job = queue
        .add_job_with_options(
            "sendEmail",
            json!({"to": "user@example.com", "subject": "Urgent", "content": "Please read"}),
            opts,
        )
        .await?;
    println!("[enqueue] delayed sendEmail id={}", job.id);

    // Rejected before anything reaches Redis
    match queue
        .add_job("sendEmail", json!({"to": "not-an-email", "subject": "S", "content": "C"}))
        .await
    {
        Err(TypedQueueError::Validation { issues, .. }) => {
            println!("[enqueue] rejected: {}", issues)
        }
        Err(e) if e.is_validation() => println!("[enqueue] rejected: {}", e),
        other => println!("[enqueue] unexpected: {:?}", other.map(|job| job.id)),
    }

    queue.close().await?;
    Ok(())
}
