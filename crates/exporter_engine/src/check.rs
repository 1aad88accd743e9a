use export_logging::{export_debug, export_warn};

use crate::fetch::ConfluenceApi;
use crate::types::{CurrentUser, FetchError, PageSummary, Space};

/// What the credentials can see; produced without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub user: CurrentUser,
    pub spaces: Vec<Space>,
    /// The requested space, when one was given and it is readable.
    pub space: Option<Space>,
    pub space_error: Option<FetchError>,
    pub sample_page: Option<PageSummary>,
}

/// Verifies credentials and looks at up to `space_limit` spaces. Failing to
/// read the current user or the space list is an error; problems with the
/// requested space are part of the report.
pub async fn check_connection(
    api: &dyn ConfluenceApi,
    space_key: Option<&str>,
    space_limit: u32,
) -> Result<ConnectionReport, FetchError> {
    let user = api.current_user().await?;
    export_debug!("authenticated as {}", user.display_name);
    let spaces = api.list_spaces(space_limit).await?;

    let mut report = ConnectionReport {
        user,
        spaces,
        space: None,
        space_error: None,
        sample_page: None,
    };
    let Some(space_key) = space_key else {
        return Ok(report);
    };

    match api.get_space(space_key).await {
        Ok(space) => report.space = Some(space),
        Err(err) => {
            report.space_error = Some(err);
            return Ok(report);
        }
    }
    match api.list_pages(space_key, None).await {
        Ok(batch) => report.sample_page = batch.pages.into_iter().next(),
        Err(err) => export_warn!("could not list pages of {space_key}: {err}"),
    }
    Ok(report)
}
