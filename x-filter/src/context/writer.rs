//! Output ownership
//!
//! Output flows through a stack of claimed writers down to the root
//! serializer. Each writer sees an event before the writers below it and
//! decides whether it was handled or should keep going down. Claims are keyed
//! by (fragment, owner) so the visitor that claimed output for a fragment can
//! find its writer again in a later hook.

use tracing::warn;
use xml_model::{ContentEvent, XmlSerializer};

use crate::error::{Error, Result};
use crate::fragment::FragmentId;

/// What a writer did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consumed; writers below never see it
    Handled,
    /// Continue to the next writer down
    PassDown,
}

/// A writer that can claim output
pub trait OutputWriter: Send {
    fn write(&mut self, event: &ContentEvent<'_>) -> Result<Disposition>;

    /// Anything the writer collected, for writers that capture
    fn take_output(&mut self) -> Option<String> {
        None
    }
}

/// Swallows everything
#[derive(Debug, Default)]
pub struct DiscardWriter;

impl OutputWriter for DiscardWriter {
    fn write(&mut self, _event: &ContentEvent<'_>) -> Result<Disposition> {
        Ok(Disposition::Handled)
    }
}

/// Drops the claimed element's own tags and lets its content through
#[derive(Debug, Default)]
pub struct ChildrenOnlyWriter {
    depth: usize,
}

impl ChildrenOnlyWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputWriter for ChildrenOnlyWriter {
    fn write(&mut self, event: &ContentEvent<'_>) -> Result<Disposition> {
        match event {
            ContentEvent::StartElement(_) => {
                self.depth += 1;
                Ok(if self.depth == 1 {
                    Disposition::Handled
                } else {
                    Disposition::PassDown
                })
            }
            ContentEvent::EndElement(_) => {
                let outermost = self.depth == 1;
                self.depth = self.depth.saturating_sub(1);
                Ok(if outermost {
                    Disposition::Handled
                } else {
                    Disposition::PassDown
                })
            }
            ContentEvent::Text(_) => Ok(Disposition::PassDown),
        }
    }
}

/// Records what passes through it without stopping it
#[derive(Debug, Default)]
pub struct CaptureWriter {
    serializer: XmlSerializer,
    depth: usize,
    children_only: bool,
}

impl CaptureWriter {
    pub fn new(children_only: bool) -> Self {
        Self {
            serializer: XmlSerializer::new(),
            depth: 0,
            children_only,
        }
    }
}

impl OutputWriter for CaptureWriter {
    fn write(&mut self, event: &ContentEvent<'_>) -> Result<Disposition> {
        let own_tag = match event {
            ContentEvent::StartElement(_) => {
                self.depth += 1;
                self.depth == 1
            }
            ContentEvent::EndElement(_) => {
                let outermost = self.depth == 1;
                self.depth = self.depth.saturating_sub(1);
                outermost
            }
            ContentEvent::Text(_) => false,
        };
        if !(self.children_only && own_tag) {
            self.serializer.write(event)?;
        }
        Ok(Disposition::PassDown)
    }

    fn take_output(&mut self) -> Option<String> {
        std::mem::take(&mut self.serializer).into_string().ok()
    }
}

struct Claim {
    fragment: FragmentId,
    owner: String,
    writer: Box<dyn OutputWriter>,
}

/// Claimed writers over the root serializer
pub struct WriterStack {
    root: XmlSerializer,
    claims: Vec<Claim>,
}

impl WriterStack {
    pub fn new() -> Self {
        Self {
            root: XmlSerializer::new(),
            claims: Vec::new(),
        }
    }

    /// Put a writer on top of the stack for (fragment, owner)
    pub fn claim(&mut self, fragment: FragmentId, owner: &str, writer: Box<dyn OutputWriter>) -> Result<()> {
        if self.is_claimed(fragment, owner) {
            return Err(Error::writer_claim(format!(
                "'{}' already holds a writer for fragment {}",
                owner, fragment
            )));
        }
        self.claims.push(Claim {
            fragment,
            owner: owner.to_string(),
            writer,
        });
        Ok(())
    }

    /// Remove the writer claimed for (fragment, owner), wherever it sits in the stack
    pub fn restore(&mut self, fragment: FragmentId, owner: &str) -> Result<Box<dyn OutputWriter>> {
        let position = self
            .claims
            .iter()
            .rposition(|claim| claim.fragment == fragment && claim.owner == owner)
            .ok_or_else(|| {
                Error::writer_claim(format!(
                    "'{}' holds no writer for fragment {}",
                    owner, fragment
                ))
            })?;
        Ok(self.claims.remove(position).writer)
    }

    pub fn is_claimed(&self, fragment: FragmentId, owner: &str) -> bool {
        self.claims
            .iter()
            .any(|claim| claim.fragment == fragment && claim.owner == owner)
    }

    /// Number of outstanding claims
    pub fn depth(&self) -> usize {
        self.claims.len()
    }

    /// Write through the claims, top first, then the root serializer
    pub fn write(&mut self, event: &ContentEvent<'_>) -> Result<()> {
        for claim in self.claims.iter_mut().rev() {
            if claim.writer.write(event)? == Disposition::Handled {
                return Ok(());
            }
        }
        Ok(self.root.write(event)?)
    }

    /// Drop every outstanding claim, logging each one
    pub fn release_all(&mut self) -> usize {
        let released = self.claims.len();
        for claim in self.claims.drain(..).rev() {
            warn!(
                owner = %claim.owner,
                fragment = %claim.fragment,
                "Writer claim was never restored; releasing it at end of pass"
            );
        }
        released
    }

    /// Root output written so far
    pub fn output(&self) -> &[u8] {
        self.root.as_bytes()
    }

    /// Take the root output, leaving an empty serializer behind
    pub fn take_output(&mut self) -> Result<String> {
        Ok(std::mem::take(&mut self.root).into_string()?)
    }
}

impl Default for WriterStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WriterStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterStack")
            .field("root", &self.root)
            .field(
                "claims",
                &self
                    .claims
                    .iter()
                    .map(|c| (c.fragment, c.owner.as_str()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xml_model::{Element, QName};

    fn write_subtree(stack: &mut WriterStack) {
        let b = Element::new(QName::local("b"));
        let c = Element::new(QName::local("c"));
        stack.write(&ContentEvent::StartElement(&b)).unwrap();
        stack.write(&ContentEvent::StartElement(&c)).unwrap();
        stack.write(&ContentEvent::Text("t")).unwrap();
        stack.write(&ContentEvent::EndElement(&c.name)).unwrap();
        stack.write(&ContentEvent::EndElement(&b.name)).unwrap();
    }

    #[test]
    fn unclaimed_output_reaches_the_root() {
        let mut stack = WriterStack::new();
        write_subtree(&mut stack);
        assert_eq!(stack.take_output().unwrap(), "<b><c>t</c></b>");
    }

    #[test]
    fn discard_and_children_only() {
        let fragment = FragmentId::new();
        let mut stack = WriterStack::new();
        stack.claim(fragment, "remove", Box::new(DiscardWriter)).unwrap();
        write_subtree(&mut stack);
        stack.restore(fragment, "remove").unwrap();
        assert_eq!(stack.take_output().unwrap(), "");

        stack.claim(fragment, "remove", Box::new(ChildrenOnlyWriter::new())).unwrap();
        write_subtree(&mut stack);
        stack.restore(fragment, "remove").unwrap();
        assert_eq!(stack.take_output().unwrap(), "<c>t</c>");
    }

    #[test]
    fn capture_passes_output_down() {
        let fragment = FragmentId::new();
        let mut stack = WriterStack::new();
        stack.claim(fragment, "capture", Box::new(CaptureWriter::new(true))).unwrap();
        write_subtree(&mut stack);
        let mut writer = stack.restore(fragment, "capture").unwrap();
        assert_eq!(writer.take_output().unwrap(), "<c>t</c>");
        assert_eq!(stack.take_output().unwrap(), "<b><c>t</c></b>");
    }

    #[test]
    fn restore_finds_claims_below_the_top() {
        let (first, second) = (FragmentId::new(), FragmentId::new());
        let mut stack = WriterStack::new();
        stack.claim(first, "x", Box::new(DiscardWriter)).unwrap();
        stack.claim(second, "x", Box::new(CaptureWriter::new(false))).unwrap();
        assert!(stack.restore(first, "x").is_ok());
        assert_eq!(stack.depth(), 1);
        assert!(stack.is_claimed(second, "x"));
        assert!(stack.restore(first, "x").is_err());
    }

    #[test]
    fn duplicate_claims_are_rejected() {
        let fragment = FragmentId::new();
        let mut stack = WriterStack::new();
        stack.claim(fragment, "x", Box::new(DiscardWriter)).unwrap();
        assert!(stack.claim(fragment, "x", Box::new(DiscardWriter)).is_err());
        assert_eq!(stack.release_all(), 1);
        assert_eq!(stack.depth(), 0);
    }
}
