use harvest_core::{CommentNode, HarvestConfig, RawComment, RedditComment, RedditPost, Traversal};
use std::collections::VecDeque;

/// Flattens a post's comment tree into a bounded list of storable comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentExtractor {
    traversal: Traversal,
    filter_before_truncate: bool,
}

impl CommentExtractor {
    pub fn new(traversal: Traversal, filter_before_truncate: bool) -> Self {
        Self {
            traversal,
            filter_before_truncate,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.traversal, config.filter_before_truncate)
    }

    /// Every node of the forest, placeholders included.
    pub fn flatten<'a>(&self, roots: &'a [CommentNode]) -> Vec<&'a CommentNode> {
        let mut flat = Vec::new();
        match self.traversal {
            Traversal::BreadthFirst => {
                let mut queue: VecDeque<&CommentNode> = roots.iter().collect();
                while let Some(node) = queue.pop_front() {
                    flat.push(node);
                    queue.extend(node.replies());
                }
            }
            Traversal::DepthFirst => {
                let mut stack: Vec<&CommentNode> = roots.iter().rev().collect();
                while let Some(node) = stack.pop() {
                    flat.push(node);
                    stack.extend(node.replies().iter().rev());
                }
            }
        }
        flat
    }

    /// At most `max_count` comments of `tree`, with placeholders and
    /// authorless comments removed.
    ///
    /// By default the first `max_count` raw nodes are taken before filtering,
    /// so dropped nodes still use up the budget.
    pub fn extract(
        &self,
        post: &RedditPost,
        tree: &[CommentNode],
        max_count: usize,
    ) -> Vec<RedditComment> {
        let flat = self.flatten(tree);

        let kept: Vec<&RawComment> = if self.filter_before_truncate {
            flat.into_iter()
                .filter_map(authored)
                .take(max_count)
                .collect()
        } else {
            flat.into_iter()
                .take(max_count)
                .filter_map(authored)
                .collect()
        };

        kept.into_iter()
            .map(|comment| RedditComment {
                created: comment.created,
                author: comment.author.clone(),
                body: comment.body.clone(),
                score: comment.score,
                post_id: post.id.clone(),
            })
            .collect()
    }
}

fn authored(node: &CommentNode) -> Option<&RawComment> {
    match node {
        CommentNode::Comment(comment) if comment.author.is_some() => Some(comment),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_core::{MoreComments, PostBody};

    fn comment(id: &str, author: Option<&str>, replies: Vec<CommentNode>) -> CommentNode {
        CommentNode::Comment(RawComment {
            id: id.to_string(),
            author: author.map(str::to_string),
            body: format!("body {}", id),
            score: 1,
            created: Utc.timestamp_opt(1388534400, 0).unwrap(),
            replies,
        })
    }

    fn more(id: &str) -> CommentNode {
        CommentNode::More(MoreComments {
            id: id.to_string(),
            count: 5,
            children: vec![],
        })
    }

    fn post() -> RedditPost {
        RedditPost {
            id: "t3_post".to_string(),
            title: "title".to_string(),
            body: PostBody::SelfText(String::new()),
            score: 0,
            created: Utc.timestamp_opt(1388534400, 0).unwrap(),
            subreddit_id: "t5_x".to_string(),
            subreddit: "x".to_string(),
        }
    }

    //   a            d     m1
    //   ├─ b         └─ e
    //   │  └─ c
    //   └─ x (deleted)
    fn tree() -> Vec<CommentNode> {
        vec![
            comment(
                "a",
                Some("alice"),
                vec![
                    comment("b", Some("bob"), vec![comment("c", Some("carol"), vec![])]),
                    comment("x", None, vec![]),
                ],
            ),
            comment("d", Some("dave"), vec![comment("e", Some("erin"), vec![])]),
            more("m1"),
        ]
    }

    fn ids(nodes: &[&CommentNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| match node {
                CommentNode::Comment(c) => c.id.clone(),
                CommentNode::More(m) => m.id.clone(),
            })
            .collect()
    }

    fn bodies(comments: &[RedditComment]) -> Vec<&str> {
        comments.iter().map(|c| c.body.as_str()).collect()
    }

    #[test]
    fn test_breadth_first_order() {
        let tree = tree();
        let extractor = CommentExtractor::new(Traversal::BreadthFirst, false);
        assert_eq!(
            ids(&extractor.flatten(&tree)),
            vec!["a", "d", "m1", "b", "x", "e", "c"]
        );
    }

    #[test]
    fn test_depth_first_order() {
        let tree = tree();
        let extractor = CommentExtractor::new(Traversal::DepthFirst, false);
        assert_eq!(
            ids(&extractor.flatten(&tree)),
            vec!["a", "b", "c", "x", "d", "e", "m1"]
        );
    }

    #[test]
    fn test_truncate_then_filter() {
        let extractor = CommentExtractor::default();
        // First five raw nodes: a d m1 b x -> placeholder and deleted dropped.
        let comments = extractor.extract(&post(), &tree(), 5);
        assert_eq!(bodies(&comments), vec!["body a", "body d", "body b"]);
        assert!(comments.iter().all(|c| c.post_id == "t3_post"));
    }

    #[test]
    fn test_filter_then_truncate() {
        let extractor = CommentExtractor::new(Traversal::BreadthFirst, true);
        let comments = extractor.extract(&post(), &tree(), 5);
        assert_eq!(
            bodies(&comments),
            vec!["body a", "body d", "body b", "body e", "body c"]
        );
    }

    #[test]
    fn test_bounds_and_authors() {
        let tree = tree();
        for traversal in [Traversal::BreadthFirst, Traversal::DepthFirst] {
            for filter_first in [false, true] {
                let extractor = CommentExtractor::new(traversal, filter_first);
                for max_count in 0..10 {
                    let comments = extractor.extract(&post(), &tree, max_count);
                    assert!(comments.len() <= max_count);
                    assert!(comments.iter().all(|c| c.author.is_some()));
                }
            }
        }
    }

    #[test]
    fn test_empty_tree() {
        let extractor = CommentExtractor::default();
        assert!(extractor.extract(&post(), &[], 100).is_empty());
    }
}
