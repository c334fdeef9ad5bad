use super::Node;
use crate::{error::Result, model::Tracks};
use reqwest::header::AUTHORIZATION;
use tracing::{debug, instrument};

impl Node {
    /// Asks this node to resolve `query` into playable tracks.
    ///
    /// `query` may be a URL understood by one of the node's sources, or a
    /// search prefixed by a source identifier such as `ytsearch:`. Results
    /// are returned as the node reports them: a query which matches nothing
    /// is an `Ok` with [`LoadType::NoMatches`].
    ///
    /// [`LoadType::NoMatches`]: crate::model::LoadType::NoMatches
    #[instrument(skip(self), fields(node = %self.id))]
    pub async fn load_tracks(&self, query: &str) -> Result<Tracks> {
        let url = format!("{}/loadtracks", self.config.rest);

        let tracks = self
            .http
            .get(&url)
            .query(&[("identifier", query)])
            .header(AUTHORIZATION, self.config.password.as_str())
            .send()
            .await?
            .error_for_status()?
            .json::<Tracks>()
            .await?;

        debug!(
            "Node {} loaded {} track(s) ({:?}).",
            self.id,
            tracks.tracks.len(),
            tracks.load_type
        );

        Ok(tracks)
    }
}
