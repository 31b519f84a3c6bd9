// XML API operational commands and jobs
//
// `type=op`, `type=user-id`, `type=commit`, `type=log` and `type=export`.
// Commit and log requests start a job on the device; the synchronous forms
// poll it until it reports `FIN` or the deadline passes.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::Error;
use crate::xapi::client::{Params, XapiClient};
use crate::xapi::response::ApiResponse;

/// Terminal job status.
const JOB_FINISHED: &str = "FIN";

/// How a job-starting request waits for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolling {
    /// Wait for the job to finish (ignored by `log`, which always waits).
    pub sync: bool,
    /// Delay between status queries.
    pub interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for JobPolling {
    fn default() -> Self {
        Self {
            sync: false,
            interval: Duration::from_millis(500),
            timeout: None,
        }
    }
}

impl JobPolling {
    /// Wait for completion with the default interval and no timeout.
    pub fn sync() -> Self {
        Self {
            sync: true,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// A zero timeout means no timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

/// Encode a whitespace-separated operational command as nested tags.
///
/// Quoted tokens become element text:
///
/// ```
/// assert_eq!(
///     panos_api::cmd_xml(r#"show jobs id "5""#),
///     "<show><jobs><id>5</id></jobs></show>"
/// );
/// ```
pub fn cmd_xml(cmd: &str) -> String {
    let tokens: Vec<&str> = cmd.split_whitespace().collect();
    let literal = |t: &str| -> Option<String> {
        (t.len() >= 2 && t.starts_with('"') && t.ends_with('"'))
            .then(|| t[1..t.len() - 1].to_owned())
    };

    let mut xml = String::new();
    for token in &tokens {
        match literal(token) {
            Some(text) => xml.push_str(&text),
            None => {
                xml.push('<');
                xml.push_str(token);
                xml.push('>');
            }
        }
    }
    for token in tokens.iter().rev() {
        if literal(token).is_none() {
            xml.push_str("</");
            xml.push_str(token);
            xml.push('>');
        }
    }
    xml
}

#[derive(Clone, Copy)]
enum JobKind<'a> {
    Commit { query: &'a str },
    Log,
}

impl XapiClient {
    /// Run an operational command. Unless `already_xml` is set, `cmd` is
    /// encoded with [`cmd_xml`] first.
    pub async fn op(
        &self,
        cmd: &str,
        vsys: Option<&str>,
        already_xml: bool,
    ) -> Result<ApiResponse, Error> {
        let cmd = if already_xml { cmd.to_owned() } else { cmd_xml(cmd) };
        debug!(cmd = %cmd, serial = ?self.serial(), "op request");
        let mut params: Params = vec![("type", "op".into()), ("cmd", cmd)];
        if let Some(vsys) = vsys {
            params.push(("vsys", vsys.to_owned()));
        }
        self.keyed(params, true).await
    }

    /// Send a user-id message (dynamic address registration).
    ///
    /// A rejection because the address/tag pair is already registered is
    /// treated as success; the rejected response stays available as the
    /// last response.
    pub async fn user_id(&self, cmd: &str, vsys: Option<&str>) -> Result<ApiResponse, Error> {
        let mut params: Params = vec![("type", "user-id".into()), ("cmd", cmd.to_owned())];
        if let Some(vsys) = vsys {
            params.push(("vsys", vsys.to_owned()));
        }
        match self.keyed(params, true).await {
            Err(e) if e.is_already_registered() => {
                debug!(detail = %e, "user-id entry already registered");
                Ok(self.last_response().unwrap_or_default())
            }
            other => other,
        }
    }

    /// Submit a commit and, when `polling.sync` is set, wait for its job.
    ///
    /// Returns the submission response, or the final job status response
    /// when waiting.
    pub async fn commit(
        &self,
        cmd: &str,
        action: Option<&str>,
        polling: JobPolling,
    ) -> Result<ApiResponse, Error> {
        let mut params: Params = vec![("type", "commit".into()), ("cmd", cmd.to_owned())];
        if let Some(action) = action {
            params.push(("action", action.to_owned()));
        }
        let submitted = self.keyed(params, true).await?;

        if !polling.sync {
            return Ok(submitted);
        }
        let Some(job_id) = submitted.find_text("result/job").map(str::to_owned) else {
            debug!("commit returned no job, nothing to wait for");
            return Ok(submitted);
        };

        debug!(job_id = %job_id, "waiting for commit job");
        let query = format!("show jobs id \"{job_id}\"");
        self.poll_job(&job_id, JobKind::Commit { query: &query }, polling)
            .await
    }

    /// Retrieve logs. The log job is always waited for.
    pub async fn log(
        &self,
        log_type: Option<&str>,
        nlogs: Option<u32>,
        skip: Option<u32>,
        filter: Option<&str>,
        polling: JobPolling,
    ) -> Result<ApiResponse, Error> {
        let mut params: Params = vec![("type", "log".into())];
        if let Some(log_type) = log_type {
            params.push(("log-type", log_type.to_owned()));
        }
        if let Some(nlogs) = nlogs {
            params.push(("nlogs", nlogs.to_string()));
        }
        if let Some(skip) = skip {
            params.push(("skip", skip.to_string()));
        }
        if let Some(filter) = filter {
            params.push(("query", filter.to_owned()));
        }
        let submitted = self.keyed(params, false).await?;

        let job_id = submitted
            .find_text("result/job")
            .map(str::to_owned)
            .ok_or_else(|| Error::protocol("no job element in type=log response"))?;

        debug!(job_id = %job_id, "waiting for log job");
        self.poll_job(&job_id, JobKind::Log, polling).await
    }

    /// Export a file (`type=export`). The category is echoed onto the
    /// attachment.
    pub async fn export(
        &self,
        category: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<ApiResponse, Error> {
        let mut params: Params = vec![("type", "export".into()), ("category", category.to_owned())];
        if let Some(from) = from {
            params.push(("from", from.to_owned()));
        }
        if let Some(to) = to {
            params.push(("to", to.to_owned()));
        }
        let mut response = self.keyed(params, false).await?;
        if let Some(attachment) = response.attachment.as_mut() {
            attachment.category = Some(category.to_owned());
        }
        Ok(response)
    }

    async fn poll_job(
        &self,
        job_id: &str,
        kind: JobKind<'_>,
        polling: JobPolling,
    ) -> Result<ApiResponse, Error> {
        let start = Instant::now();
        loop {
            let response = match kind {
                JobKind::Commit { query } => {
                    self.op(query, None, false).await.map_err(|e| match e {
                        Error::Protocol { message, code } => Error::Protocol {
                            message: format!("commit {query}: {message}"),
                            code,
                        },
                        other => other,
                    })?
                }
                JobKind::Log => {
                    let params: Params = vec![
                        ("type", "log".into()),
                        ("action", "get".into()),
                        ("job-id", job_id.to_owned()),
                    ];
                    self.keyed(params, false).await?
                }
            };

            let status = response.find_text("result/job/status").ok_or_else(|| {
                Error::protocol(match kind {
                    JobKind::Commit { query } => format!("no status element in '{query}' response"),
                    JobKind::Log => "no status element in type=log&action=get response".into(),
                })
            })?;
            if status == JOB_FINISHED {
                debug!(job_id, "job finished");
                return Ok(response);
            }
            debug!(job_id, status, "job still running");

            if let Some(timeout) = polling.timeout {
                let waited = start.elapsed();
                if waited > timeout {
                    return Err(Error::Timeout {
                        job_id: job_id.to_owned(),
                        waited,
                    });
                }
            }
            sleep(polling.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_xml_nests_tokens_and_inlines_literals() {
        assert_eq!(cmd_xml(r#"show jobs id "5""#), "<show><jobs><id>5</id></jobs></show>");
        assert_eq!(cmd_xml("show system info"), "<show><system><info></info></system></show>");
        assert_eq!(cmd_xml(""), "");
    }

    #[test]
    fn zero_timeout_means_none() {
        let polling = JobPolling::sync().with_timeout(Duration::ZERO);
        assert_eq!(polling.timeout, None);
        let polling = JobPolling::sync().with_timeout(Duration::from_secs(3));
        assert_eq!(polling.timeout, Some(Duration::from_secs(3)));
        assert_eq!(JobPolling::default().interval, Duration::from_millis(500));
    }
}
